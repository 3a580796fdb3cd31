//! Background maintenance — summarization and fact extraction.
//!
//! Neither path is part of assembly. They run off the request path, write
//! into the stores under short locks, and never surface errors to the
//! caller: a failed summarization leaves its range unsummarized so the next
//! trigger picks it up again, and a failed extraction is simply skipped.

use chrono::Utc;
use contextual_config::AppConfig;
use contextual_core::capability::{FactExtractor, Summarizer};
use contextual_core::error::{Error, MaintenanceError};
use contextual_core::event::{DomainEvent, EventBus};
use contextual_core::memory::MemoryChunk;
use contextual_core::turn::{Turn, TurnLog, TurnRange};
use contextual_memory::{FactStore, MemoryStore};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// When and how much to summarize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummarizationPolicy {
    /// Turns kept verbatim; never summarized while inside the window.
    pub window: usize,
    /// Trigger once this many turns sit outside the window unsummarized.
    pub summarize_every: usize,
    /// Largest range folded into one chunk.
    pub max_chunk_turns: usize,
}

impl Default for SummarizationPolicy {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for SummarizationPolicy {
    fn from(config: &AppConfig) -> Self {
        Self {
            window: config.context.window.max(1),
            summarize_every: config.maintenance.summarize_every.max(1),
            max_chunk_turns: config.maintenance.max_chunk_turns.max(1),
        }
    }
}

impl SummarizationPolicy {
    /// Turns that have left the window and are not yet covered by a chunk.
    pub fn eligible<'t>(&self, turns: &'t [Turn], covered_through: u64) -> &'t [Turn] {
        let older = &turns[..turns.len().saturating_sub(self.window)];
        let start = older.partition_point(|t| t.index <= covered_through);
        &older[start..]
    }

    /// Full eligible range, e.g. turns 1–4 for 12 turns and a window of 8.
    pub fn eligible_range(&self, turns: &[Turn], covered_through: u64) -> Option<TurnRange> {
        TurnRange::spanning(self.eligible(turns, covered_through))
    }

    /// Whether enough turns have piled up outside the window.
    pub fn should_summarize(&self, turns: &[Turn], covered_through: u64) -> bool {
        self.eligible(turns, covered_through).len() >= self.summarize_every
    }

    /// The oldest unsummarized run, capped at `max_chunk_turns`.
    pub fn next_batch<'t>(&self, turns: &'t [Turn], covered_through: u64) -> &'t [Turn] {
        let eligible = self.eligible(turns, covered_through);
        &eligible[..eligible.len().min(self.max_chunk_turns)]
    }
}

/// Summarize a run of turns into an unindexed chunk.
pub async fn summarize_turns(
    summarizer: &dyn Summarizer,
    turns: &[Turn],
) -> Result<MemoryChunk, MaintenanceError> {
    let Some(range) = TurnRange::spanning(turns) else {
        return Err(MaintenanceError::SummarizationFailed {
            range: "none".into(),
            reason: "no turns to summarize".into(),
        });
    };

    let summary = summarizer.summarize(turns).await?;
    let summary = summary.trim();
    if summary.is_empty() {
        return Err(MaintenanceError::SummarizationFailed {
            range: range.to_string(),
            reason: format!("{} returned an empty summary", summarizer.name()),
        });
    }

    Ok(MemoryChunk::new(summary, range))
}

/// Run the extractor over one turn, keeping only well-formed pairs.
pub async fn extract_pairs(
    extractor: &dyn FactExtractor,
    turn: &Turn,
) -> Result<Vec<(String, String)>, MaintenanceError> {
    let pairs = extractor.extract_facts(turn).await?;
    Ok(pairs
        .into_iter()
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, v)| !k.is_empty() && !v.is_empty())
        .collect())
}

/// Runs maintenance jobs for one conversation.
///
/// Results are applied under the write guard of the conversation's
/// lifecycle gate, which assembly holds for reading while it snapshots and
/// teardown holds while it clears. Once the gate reads `closed`, finished
/// work is discarded instead of applied. Summarization passes are
/// serialized so two passes never pick the same batch.
pub(crate) struct Maintainer {
    pub(crate) conversation_id: String,
    pub(crate) policy: SummarizationPolicy,
    pub(crate) log: Arc<RwLock<TurnLog>>,
    pub(crate) facts: FactStore,
    pub(crate) memory: MemoryStore,
    pub(crate) summarizer: Arc<dyn Summarizer>,
    pub(crate) extractor: Option<Arc<dyn FactExtractor>>,
    pub(crate) closed: Arc<RwLock<bool>>,
    pub(crate) summarizing: Mutex<()>,
    pub(crate) events: Arc<EventBus>,
}

impl Maintainer {
    /// Summarize the oldest eligible run if the trigger threshold is met.
    pub async fn run_summarization(&self) -> Result<Option<TurnRange>, Error> {
        let _pass = self.summarizing.lock().await;
        let covered = self.memory.covered_through().await;
        let batch: Vec<Turn> = {
            let log = self.log.read().await;
            if !self.policy.should_summarize(log.turns(), covered) {
                return Ok(None);
            }
            self.policy.next_batch(log.turns(), covered).to_vec()
        };
        self.summarize_batch(batch).await
    }

    /// Summarize every eligible turn now, regardless of the trigger.
    pub async fn flush(&self) -> Result<Vec<TurnRange>, Error> {
        let _pass = self.summarizing.lock().await;
        let mut stored = Vec::new();
        loop {
            let covered = self.memory.covered_through().await;
            let batch: Vec<Turn> = {
                let log = self.log.read().await;
                self.policy.next_batch(log.turns(), covered).to_vec()
            };
            match self.summarize_batch(batch).await? {
                Some(range) => stored.push(range),
                None => return Ok(stored),
            }
        }
    }

    /// Extract facts from one turn and upsert them. Returns the count applied.
    pub async fn run_extraction(&self, turn: &Turn) -> Result<usize, Error> {
        let Some(extractor) = &self.extractor else {
            return Ok(0);
        };

        let pairs = extract_pairs(extractor.as_ref(), turn).await?;
        if pairs.is_empty() {
            return Ok(0);
        }

        let closed = self.closed.write().await;
        if *closed {
            debug!(
                conversation = %self.conversation_id,
                "Discarding facts for closed conversation"
            );
            return Ok(0);
        }
        let applied = self.facts.upsert_many(pairs).await;
        drop(closed);

        if applied > 0 {
            self.events.publish(DomainEvent::FactsUpdated {
                conversation_id: self.conversation_id.clone(),
                count: applied,
                timestamp: Utc::now(),
            });
        }
        Ok(applied)
    }

    /// Log and publish a maintenance failure. Never propagates.
    pub fn report_failure(&self, err: &Error) {
        warn!(
            conversation = %self.conversation_id,
            "Maintenance failed, will retry on next trigger: {err}"
        );
        self.events.publish(DomainEvent::MaintenanceFailed {
            conversation_id: self.conversation_id.clone(),
            error_message: err.to_string(),
            timestamp: Utc::now(),
        });
    }

    async fn summarize_batch(&self, batch: Vec<Turn>) -> Result<Option<TurnRange>, Error> {
        if batch.is_empty() {
            return Ok(None);
        }

        let chunk = summarize_turns(self.summarizer.as_ref(), &batch).await?;
        let embedding = self.memory.embed(&chunk.summary).await?;
        let chunk = chunk.with_embedding(embedding);
        let range = chunk.range;

        let closed = self.closed.write().await;
        if *closed {
            debug!(
                conversation = %self.conversation_id,
                range = %range,
                "Discarding summary for closed conversation"
            );
            return Ok(None);
        }
        self.memory.add_chunk(chunk).await?;
        drop(closed);

        info!(conversation = %self.conversation_id, range = %range, "Summarized turns into memory");
        self.events.publish(DomainEvent::ChunkStored {
            conversation_id: self.conversation_id.clone(),
            first: range.first,
            last: range.last,
            timestamp: Utc::now(),
        });
        Ok(Some(range))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use contextual_core::turn::Role;
    use contextual_memory::HashEmbedder;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn log_with(n: usize) -> TurnLog {
        let mut log = TurnLog::new();
        for i in 1..=n {
            log.push(Role::User, format!("turn {i} content")).unwrap();
        }
        log
    }

    fn policy(window: usize, every: usize, max: usize) -> SummarizationPolicy {
        SummarizationPolicy {
            window,
            summarize_every: every,
            max_chunk_turns: max,
        }
    }

    struct JoinSummarizer;

    #[async_trait]
    impl Summarizer for JoinSummarizer {
        fn name(&self) -> &str {
            "join"
        }

        async fn summarize(&self, turns: &[Turn]) -> Result<String, MaintenanceError> {
            Ok(turns.iter().map(|t| t.content.as_str()).collect::<Vec<_>>().join("; "))
        }
    }

    /// Fails the first `failures` calls, then succeeds.
    struct FlakySummarizer {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Summarizer for FlakySummarizer {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn summarize(&self, turns: &[Turn]) -> Result<String, MaintenanceError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(MaintenanceError::SummarizationFailed {
                    range: TurnRange::spanning(turns).map(|r| r.to_string()).unwrap_or_default(),
                    reason: "upstream timeout".into(),
                });
            }
            Ok(format!("{} turns summarized", turns.len()))
        }
    }

    /// Counts calls and yields mid-summary so concurrent passes interleave.
    #[derive(Default)]
    struct YieldingSummarizer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Summarizer for YieldingSummarizer {
        fn name(&self) -> &str {
            "yielding"
        }

        async fn summarize(&self, turns: &[Turn]) -> Result<String, MaintenanceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            for _ in 0..4 {
                tokio::task::yield_now().await;
            }
            Ok(format!("{} turns summarized", turns.len()))
        }
    }

    struct BlankSummarizer;

    #[async_trait]
    impl Summarizer for BlankSummarizer {
        fn name(&self) -> &str {
            "blank"
        }

        async fn summarize(&self, _turns: &[Turn]) -> Result<String, MaintenanceError> {
            Ok("   ".into())
        }
    }

    struct ScriptedExtractor(Vec<(String, String)>);

    #[async_trait]
    impl FactExtractor for ScriptedExtractor {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn extract_facts(
            &self,
            _turn: &Turn,
        ) -> Result<Vec<(String, String)>, MaintenanceError> {
            Ok(self.0.clone())
        }
    }

    fn maintainer(
        log: TurnLog,
        policy: SummarizationPolicy,
        summarizer: Arc<dyn Summarizer>,
        extractor: Option<Arc<dyn FactExtractor>>,
    ) -> Maintainer {
        Maintainer {
            conversation_id: log.id.to_string(),
            policy,
            log: Arc::new(RwLock::new(log)),
            facts: FactStore::new(),
            memory: MemoryStore::new(Arc::new(HashEmbedder::new(32))),
            summarizer,
            extractor,
            closed: Arc::new(RwLock::new(false)),
            summarizing: Mutex::new(()),
            events: Arc::new(EventBus::default()),
        }
    }

    #[test]
    fn twelve_turns_window_eight_makes_one_to_four_eligible() {
        let log = log_with(12);
        let p = policy(8, 10, 20);
        let range = p.eligible_range(log.turns(), 0).unwrap();
        assert_eq!(range, TurnRange::new(1, 4).unwrap());
        assert!(!p.should_summarize(log.turns(), 0));
        assert!(policy(8, 4, 20).should_summarize(log.turns(), 0));
    }

    #[test]
    fn nothing_eligible_inside_window() {
        let log = log_with(6);
        assert!(policy(8, 1, 20).eligible_range(log.turns(), 0).is_none());
    }

    #[test]
    fn covered_turns_are_not_eligible_again() {
        let log = log_with(30);
        let p = policy(8, 10, 20);
        let range = p.eligible_range(log.turns(), 12).unwrap();
        assert_eq!(range, TurnRange::new(13, 22).unwrap());
    }

    #[test]
    fn batch_capped_at_max_chunk_turns() {
        let log = log_with(40);
        let batch = policy(8, 10, 5).next_batch(log.turns(), 0);
        assert_eq!(batch.len(), 5);
        assert_eq!(batch[0].index, 1);
        assert_eq!(batch[4].index, 5);
    }

    #[tokio::test]
    async fn summarization_stores_chunk_when_triggered() {
        let m = maintainer(log_with(20), policy(8, 10, 20), Arc::new(JoinSummarizer), None);
        let range = m.run_summarization().await.unwrap().unwrap();
        assert_eq!(range, TurnRange::new(1, 12).unwrap());
        assert_eq!(m.memory.covered_through().await, 12);

        // Nothing new left outside the window.
        assert!(m.run_summarization().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn below_threshold_does_nothing() {
        let m = maintainer(log_with(12), policy(8, 10, 20), Arc::new(JoinSummarizer), None);
        assert!(m.run_summarization().await.unwrap().is_none());
        assert!(m.memory.is_empty().await);
    }

    #[tokio::test]
    async fn failed_summarization_is_retried_next_trigger() {
        let flaky = Arc::new(FlakySummarizer {
            failures: 1,
            calls: AtomicUsize::new(0),
        });
        let m = maintainer(log_with(20), policy(8, 10, 20), flaky.clone(), None);

        let err = m.run_summarization().await.unwrap_err();
        assert!(matches!(err, Error::Maintenance(_)));
        assert!(m.memory.is_empty().await);

        let range = m.run_summarization().await.unwrap().unwrap();
        assert_eq!(range, TurnRange::new(1, 12).unwrap());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_summary_is_a_failure() {
        let m = maintainer(log_with(20), policy(8, 10, 20), Arc::new(BlankSummarizer), None);
        assert!(m.run_summarization().await.is_err());
        assert!(m.memory.is_empty().await);
    }

    #[tokio::test]
    async fn flush_summarizes_everything_in_batches() {
        let m = maintainer(log_with(20), policy(4, 10, 5), Arc::new(JoinSummarizer), None);
        let ranges = m.flush().await.unwrap();
        assert_eq!(ranges.len(), 4);
        assert_eq!(ranges[0], TurnRange::new(1, 5).unwrap());
        assert_eq!(ranges[3], TurnRange::new(16, 16).unwrap());
        assert_eq!(m.memory.len().await, 4);
    }

    #[tokio::test]
    async fn concurrent_passes_summarize_each_range_once() {
        let summarizer = Arc::new(YieldingSummarizer::default());
        let m = maintainer(log_with(20), policy(8, 10, 20), summarizer.clone(), None);
        let (triggered, flushed) = tokio::join!(m.run_summarization(), m.flush());
        let triggered = triggered.unwrap();
        let flushed = flushed.unwrap();
        assert_eq!(triggered.into_iter().count() + flushed.len(), 1);
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(m.memory.len().await, 1);
        assert_eq!(m.memory.covered_through().await, 12);
    }

    #[tokio::test]
    async fn closed_conversation_discards_results() {
        let m = maintainer(log_with(20), policy(8, 10, 20), Arc::new(JoinSummarizer), None);
        *m.closed.write().await = true;
        assert!(m.run_summarization().await.unwrap().is_none());
        assert!(m.memory.is_empty().await);
    }

    #[tokio::test]
    async fn extraction_upserts_valid_pairs_only() {
        let extractor = ScriptedExtractor(vec![
            ("project".into(), "assistant-X".into()),
            ("  ".into(), "orphan".into()),
            ("empty".into(), "".into()),
        ]);
        let log = log_with(1);
        let turn = log.turns()[0].clone();
        let m = maintainer(
            log,
            policy(8, 10, 20),
            Arc::new(JoinSummarizer),
            Some(Arc::new(extractor)),
        );

        assert_eq!(m.run_extraction(&turn).await.unwrap(), 1);
        let facts = m.facts.get_all().await;
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].value, "assistant-X");
    }

    #[tokio::test]
    async fn empty_extraction_is_a_noop() {
        let log = log_with(1);
        let turn = log.turns()[0].clone();
        let m = maintainer(
            log,
            policy(8, 10, 20),
            Arc::new(JoinSummarizer),
            Some(Arc::new(ScriptedExtractor(vec![]))),
        );
        assert_eq!(m.run_extraction(&turn).await.unwrap(), 0);
        assert!(m.facts.is_empty().await);
    }
}
