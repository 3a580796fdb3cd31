//! End-to-end integration tests for Contextual.
//!
//! These tests drive full conversation sessions, from appended turns
//! through background maintenance to the assembled context, using
//! scripted capabilities in place of model-backed services.

use std::sync::Arc;

use contextual_assembler::{
    AssembledContext, AssemblyInput, Capabilities, ContextAssembler, ConversationSession,
    MemoryRecall, MemoryStatus,
};
use contextual_config::AppConfig;
use contextual_core::capability::{FactExtractor, Summarizer};
use contextual_core::error::{Error, MaintenanceError};
use contextual_core::event::{DomainEvent, EventBus};
use contextual_core::memory::MemoryChunk;
use contextual_core::turn::{Role, Turn, TurnRange};
use contextual_memory::{FactStore, HashEmbedder, MemoryStore, UnavailableEmbedder};

// ── Scripted capabilities ────────────────────────────────────────────────

/// A summarizer that returns scripted results in sequence, then repeats the last.
struct ScriptedSummarizer {
    results: std::sync::Mutex<Vec<Result<String, String>>>,
    call_count: std::sync::Mutex<usize>,
}

impl ScriptedSummarizer {
    fn new(results: Vec<Result<String, String>>) -> Self {
        Self {
            results: std::sync::Mutex::new(results),
            call_count: std::sync::Mutex::new(0),
        }
    }

    fn text(summary: &str) -> Self {
        Self::new(vec![Ok(summary.to_string())])
    }

    fn calls(&self) -> usize {
        *self.call_count.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl Summarizer for ScriptedSummarizer {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn summarize(&self, turns: &[Turn]) -> Result<String, MaintenanceError> {
        let mut count = self.call_count.lock().unwrap();
        let results = self.results.lock().unwrap();
        let result = results[(*count).min(results.len() - 1)].clone();
        *count += 1;
        result.map_err(|reason| MaintenanceError::SummarizationFailed {
            range: TurnRange::spanning(turns)
                .map(|r| r.to_string())
                .unwrap_or_default(),
            reason,
        })
    }
}

/// Pulls `key=value` tokens out of user turns.
struct KeyValueExtractor;

#[async_trait::async_trait]
impl FactExtractor for KeyValueExtractor {
    fn name(&self) -> &str {
        "e2e_kv"
    }

    async fn extract_facts(&self, turn: &Turn) -> Result<Vec<(String, String)>, MaintenanceError> {
        Ok(turn
            .content
            .split_whitespace()
            .filter_map(|w| w.split_once('='))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect())
    }
}

fn config(window: usize, budget: usize) -> AppConfig {
    let mut config = AppConfig::default();
    config.context.window = window;
    config.context.token_budget = budget;
    config
}

fn session_with(config: &AppConfig, summarizer: Arc<dyn Summarizer>) -> ConversationSession {
    let caps = Capabilities {
        summarizer,
        embedder: Arc::new(HashEmbedder::new(64)),
        extractor: Some(Arc::new(KeyValueExtractor)),
    };
    ConversationSession::start(config, caps, Arc::new(EventBus::default()))
}

async fn append_many(session: &ConversationSession, n: usize) {
    for i in 1..=n {
        let role = if i % 2 == 1 { Role::User } else { Role::Assistant };
        session
            .append(role, format!("message {i} about the deployment plan"))
            .await
            .unwrap();
    }
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_twelve_turns_window_eight() {
    let summarizer = Arc::new(ScriptedSummarizer::text("deployment kickoff"));
    let session = session_with(&config(8, 4096), summarizer);
    append_many(&session, 12).await;

    let ctx = session.assemble().await.unwrap();
    let indices: Vec<u64> = ctx.recent.iter().map(|t| t.index).collect();
    assert_eq!(indices, (5..=12).collect::<Vec<_>>());

    // Turns 1–4 are eligible; nothing has been summarized yet.
    let ranges = session.maintain_now().await.unwrap();
    assert_eq!(ranges, vec![TurnRange::new(1, 4).unwrap()]);

    let ctx = session.ask("what was the deployment plan?").await.unwrap();
    assert_eq!(ctx.recent.len(), 8);
    assert_eq!(ctx.query().unwrap().content, "what was the deployment plan?");
    assert_eq!(ctx.memory.len(), 1);
    assert_eq!(ctx.memory[0].chunk.range, TurnRange::new(1, 4).unwrap());
    assert_eq!(ctx.memory[0].chunk.summary, "deployment kickoff");
}

#[tokio::test]
async fn e2e_fact_overwrite_keeps_one_fact() {
    let session = session_with(&config(8, 4096), Arc::new(ScriptedSummarizer::text("s")));
    session.append(Role::User, "we use project=assistant-X").await.unwrap();
    session.append(Role::Assistant, "noted").await.unwrap();
    session.append(Role::User, "rename it project=assistant-Y").await.unwrap();
    session.maintain_now().await.unwrap();

    let ctx = session.ask("which project?").await.unwrap();
    assert_eq!(ctx.facts.len(), 1);
    assert_eq!(ctx.facts[0].key, "project");
    assert_eq!(ctx.facts[0].value, "assistant-Y");
    assert!(ctx.render().contains("- project: assistant-Y"));
}

#[tokio::test]
async fn e2e_memory_not_ready_degrades() {
    let config = config(4, 4096);
    let caps = Capabilities {
        summarizer: Arc::new(ScriptedSummarizer::text("s")),
        embedder: Arc::new(UnavailableEmbedder),
        extractor: Some(Arc::new(KeyValueExtractor)),
    };
    let session = ConversationSession::start(&config, caps, Arc::new(EventBus::default()));
    session.append(Role::User, "lang=rust").await.unwrap();
    append_many(&session, 9).await;
    session.maintain_now().await.ok();

    let ctx = session.assemble().await.unwrap();
    assert_eq!(ctx.facts.len(), 1);
    assert!(ctx.memory.is_empty());
    assert_eq!(ctx.recent.len(), 4);
    assert!(matches!(ctx.metadata.memory_status, MemoryStatus::NotReady { .. }));
}

#[tokio::test]
async fn e2e_facts_over_budget_are_kept() {
    let session = session_with(&config(8, 12), Arc::new(ScriptedSummarizer::text("s")));
    let pairs: Vec<String> = (0..10).map(|i| format!("key{i}=value-number-{i}")).collect();
    session.append(Role::User, pairs.join(" ")).await.unwrap();
    session.maintain_now().await.unwrap();

    let ctx = session.ask("and now?").await.unwrap();
    assert_eq!(ctx.facts.len(), 10);
    assert_eq!(ctx.recent.len(), 1);
    assert_eq!(ctx.query().unwrap().content, "and now?");
    assert!(ctx.metadata.over_budget);
}

#[tokio::test]
async fn e2e_tight_budget_drops_memory_before_turns() {
    let mut config = config(3, 4096);
    config.context.retrieve_k = 3;
    let session = session_with(
        &config,
        Arc::new(ScriptedSummarizer::text(&"a long summary of the old turns ".repeat(10))),
    );
    append_many(&session, 9).await;
    session.maintain_now().await.unwrap();
    assert!(session.memory().len().await >= 1);

    let full = session.ask("status?").await.unwrap();
    assert!(!full.memory.is_empty());

    // Budget that fits the recent turns but not the memory section.
    let est = contextual_assembler::TokenEstimator::from(&config.context);
    let recent_only = 6 + est.turns(&full.recent);
    let tight = ContextAssembler::new(contextual_assembler::AssemblyPolicy {
        token_budget: recent_only,
        ..contextual_assembler::AssemblyPolicy::from(&config.context)
    });
    let turns = session.turns().await;
    let facts = session.facts().snapshot().await;
    let recall = MemoryRecall::Retrieved(full.memory.clone());
    let ctx = tight.assemble(&AssemblyInput {
        facts: &facts,
        recall: &recall,
        turns: &turns,
    });
    assert!(ctx.memory.is_empty());
    assert_eq!(ctx.recent.len(), 3);
    assert!(ctx.metadata.total_tokens <= recent_only);
}

#[tokio::test]
async fn e2e_assemble_is_deterministic() {
    let summarizer = Arc::new(ScriptedSummarizer::text("earlier discussion"));
    let session = session_with(&config(4, 4096), summarizer);
    session.append(Role::User, "owner=ada").await.unwrap();
    append_many(&session, 11).await;
    session.maintain_now().await.unwrap();

    let first: AssembledContext = session.assemble().await.unwrap();
    let second = session.assemble().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.render(), second.render());
}

#[tokio::test]
async fn e2e_summarization_failure_is_retried() {
    let summarizer = Arc::new(ScriptedSummarizer::new(vec![
        Err("model timeout".into()),
        Ok("recovered summary".into()),
    ]));
    let session = session_with(&config(8, 4096), summarizer.clone());
    append_many(&session, 12).await;

    let err = session.maintain_now().await.unwrap_err();
    assert!(matches!(err, Error::Maintenance(_)));
    assert!(session.memory().is_empty().await);

    // The range was left unsummarized, so the next pass picks it up.
    let ranges = session.maintain_now().await.unwrap();
    assert_eq!(ranges, vec![TurnRange::new(1, 4).unwrap()]);
    assert_eq!(summarizer.calls(), 2);
}

#[tokio::test]
async fn e2e_background_trigger_summarizes() {
    let mut config = config(4, 4096);
    config.maintenance.summarize_every = 5;
    let session = session_with(&config, Arc::new(ScriptedSummarizer::text("first stretch")));
    let mut events = session.subscribe();

    append_many(&session, 9).await;
    // Drains the queue; the trigger fired on the ninth append.
    session.maintain_now().await.unwrap();
    assert_eq!(session.memory().covered_through().await, 5);

    let mut chunk_events = 0;
    let mut turn_events = 0;
    while let Ok(event) = events.try_recv() {
        match &*event {
            DomainEvent::ChunkStored { first, last, .. } => {
                assert_eq!((*first, *last), (1, 5));
                chunk_events += 1;
            }
            DomainEvent::TurnAppended { .. } => turn_events += 1,
            _ => {}
        }
    }
    assert_eq!(chunk_events, 1);
    assert_eq!(turn_events, 9);
}

#[tokio::test]
async fn e2e_close_tears_down() {
    let session = session_with(&config(8, 4096), Arc::new(ScriptedSummarizer::text("s")));
    session.append(Role::User, "city=lisbon").await.unwrap();
    session.maintain_now().await.unwrap();
    assert_eq!(session.facts().len().await, 1);

    session.close().await.unwrap();
    assert!(session.facts().is_empty().await);
    assert!(session.memory().is_empty().await);
    assert!(matches!(session.ask("still there?").await, Err(Error::Closed(_))));
}

#[tokio::test]
async fn e2e_render_section_order() {
    let summarizer = Arc::new(ScriptedSummarizer::text("opening remarks"));
    let session = session_with(&config(3, 4096), summarizer);
    session.append(Role::User, "team=platform").await.unwrap();
    append_many(&session, 6).await;
    session.maintain_now().await.unwrap();

    let text = session.ask("recap please").await.unwrap().render();
    let facts = text.find("[Known Facts]").unwrap();
    let memory = text.find("[Conversation Memory]").unwrap();
    let recent = text.find("[Recent Conversation]").unwrap();
    assert!(facts < memory && memory < recent);
    assert!(text.ends_with("user: recap please"));
}

// ── Stores ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_memory_query_ties_prefer_newer_chunks() {
    let store = MemoryStore::new(Arc::new(HashEmbedder::new(64)));
    store
        .add_chunk(MemoryChunk::new("release planning notes", TurnRange::new(1, 4).unwrap()))
        .await
        .unwrap();
    store
        .add_chunk(MemoryChunk::new("release planning notes", TurnRange::new(5, 8).unwrap()))
        .await
        .unwrap();
    store
        .add_chunk(MemoryChunk::new("lunch menu", TurnRange::new(9, 12).unwrap()))
        .await
        .unwrap();

    let results = store.query("release planning", 3).await.unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].chunk.range.first, 5);
    assert_eq!(results[1].chunk.range.first, 1);
    assert!(results[0].similarity >= results[2].similarity);
    for pair in results.windows(2) {
        assert!(pair[0].similarity >= pair[1].similarity);
    }
}

#[tokio::test]
async fn e2e_memory_rejects_overlapping_ranges() {
    let store = MemoryStore::new(Arc::new(HashEmbedder::new(64)));
    store
        .add_chunk(MemoryChunk::new("a", TurnRange::new(1, 4).unwrap()))
        .await
        .unwrap();
    assert!(
        store
            .add_chunk(MemoryChunk::new("b", TurnRange::new(4, 6).unwrap()))
            .await
            .is_err()
    );
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn e2e_fact_keys_stay_unique() {
    let facts = FactStore::new();
    for (k, v) in [("a", "1"), ("b", "2"), ("a", "3"), (" b ", "4"), ("c", "5")] {
        facts.upsert(k, v).await.unwrap();
    }
    let all = facts.get_all().await;
    let keys: Vec<&str> = all.iter().map(|f| f.key.as_str()).collect();
    assert_eq!(keys, vec!["a", "b", "c"]);
    assert_eq!(facts.get("a").await.unwrap().value, "3");
    assert_eq!(facts.get("b").await.unwrap().value, "4");
    assert!(facts.upsert("  ", "x").await.is_err());
}

#[tokio::test]
async fn e2e_context_serializes_to_json() {
    let session = session_with(&config(8, 4096), Arc::new(ScriptedSummarizer::text("s")));
    session.append(Role::User, "hello there").await.unwrap();
    let ctx = session.assemble().await.unwrap();

    let json = serde_json::to_value(&ctx).unwrap();
    assert_eq!(json["recent"][0]["role"], "user");
    assert_eq!(json["metadata"]["memory_status"]["status"], "not_needed");
    assert_eq!(json["metadata"]["over_budget"], false);
}
