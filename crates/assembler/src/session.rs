//! Conversation session — the request path plus its background worker.
//!
//! A session owns one conversation's turn log and stores. Appends and
//! assembly run on the caller's task; summarization and fact extraction
//! are queued to a worker task and never block the caller.

use crate::assembler::{
    AssembledContext, AssemblyInput, AssemblyPolicy, ContextAssembler, MemoryRecall,
};
use crate::local::{ExtractiveSummarizer, PatternFactExtractor};
use crate::maintenance::{Maintainer, SummarizationPolicy};
use chrono::Utc;
use contextual_config::AppConfig;
use contextual_core::capability::{Embedder, FactExtractor, Summarizer};
use contextual_core::error::{Error, Result};
use contextual_core::event::{DomainEvent, EventBus};
use contextual_core::turn::{ConversationId, Role, Turn, TurnLog, TurnRange};
use contextual_memory::{
    FactStore, HashEmbedder, MemorySnapshot, MemoryStore, UnavailableEmbedder,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, RwLock, broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

/// The external services a session consumes.
#[derive(Clone)]
pub struct Capabilities {
    pub summarizer: Arc<dyn Summarizer>,
    pub embedder: Arc<dyn Embedder>,
    pub extractor: Option<Arc<dyn FactExtractor>>,
}

impl Capabilities {
    /// Offline capabilities selected by configuration.
    pub fn local(config: &AppConfig) -> Self {
        let embedder: Arc<dyn Embedder> = match config.memory.embedder.as_str() {
            "none" => Arc::new(UnavailableEmbedder),
            _ => Arc::new(HashEmbedder::new(config.memory.embedding_dimensions)),
        };
        Self {
            summarizer: Arc::new(ExtractiveSummarizer::new(config.maintenance.summary_max_chars)),
            embedder,
            extractor: Some(Arc::new(PatternFactExtractor::new())),
        }
    }
}

/// Work handed to the maintenance worker.
#[derive(Debug)]
pub enum MaintenanceJob {
    Summarize,
    ExtractFacts(Turn),
    /// Completes once every job queued before it has run.
    Barrier(oneshot::Sender<()>),
}

/// One live conversation.
pub struct ConversationSession {
    id: ConversationId,
    log: Arc<RwLock<TurnLog>>,
    facts: FactStore,
    memory: MemoryStore,
    assembler: ContextAssembler,
    policy: SummarizationPolicy,
    maintainer: Arc<Maintainer>,
    jobs: mpsc::Sender<MaintenanceJob>,
    shutdown: watch::Sender<bool>,
    closed: Arc<RwLock<bool>>,
    summarize_queued: Arc<AtomicBool>,
    events: Arc<EventBus>,
}

impl ConversationSession {
    /// Start a session and its maintenance worker. Must run inside a tokio runtime.
    pub fn start(config: &AppConfig, capabilities: Capabilities, events: Arc<EventBus>) -> Self {
        let log = TurnLog::new();
        let id = log.id.clone();
        let log = Arc::new(RwLock::new(log));
        let facts = FactStore::new();
        let memory = MemoryStore::new(capabilities.embedder)
            .with_min_similarity(config.memory.min_similarity);
        let policy = SummarizationPolicy::from(config);
        let closed = Arc::new(RwLock::new(false));

        let extractor = if config.maintenance.extract_facts {
            capabilities.extractor
        } else {
            None
        };

        let maintainer = Arc::new(Maintainer {
            conversation_id: id.to_string(),
            policy,
            log: log.clone(),
            facts: facts.clone(),
            memory: memory.clone(),
            summarizer: capabilities.summarizer,
            extractor,
            closed: closed.clone(),
            summarizing: Mutex::new(()),
            events: events.clone(),
        });

        let (jobs, job_rx) = mpsc::channel(config.maintenance.queue_capacity.max(1));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let summarize_queued = Arc::new(AtomicBool::new(false));

        tokio::spawn(run_worker(
            maintainer.clone(),
            job_rx,
            shutdown_rx,
            summarize_queued.clone(),
        ));

        info!(conversation = %id, "Conversation session started");

        Self {
            id,
            log,
            facts,
            memory,
            assembler: ContextAssembler::new(AssemblyPolicy::from(&config.context)),
            policy,
            maintainer,
            jobs,
            shutdown,
            closed,
            summarize_queued,
            events,
        }
    }

    pub fn id(&self) -> &ConversationId {
        &self.id
    }

    pub fn facts(&self) -> &FactStore {
        &self.facts
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.events.subscribe()
    }

    /// Copy of the turn log.
    pub async fn turns(&self) -> Vec<Turn> {
        self.log.read().await.turns().to_vec()
    }

    pub async fn is_closed(&self) -> bool {
        *self.closed.read().await
    }

    /// Append a turn and queue its maintenance. Never waits on maintenance.
    pub async fn append(&self, role: Role, content: impl Into<String>) -> Result<Turn> {
        self.ensure_open().await?;

        let covered = self.memory.covered_through().await;
        let (turn, should_summarize) = {
            let mut log = self.log.write().await;
            let turn = log.push(role, content)?.clone();
            (turn, self.policy.should_summarize(log.turns(), covered))
        };

        self.events.publish(DomainEvent::TurnAppended {
            conversation_id: self.id.to_string(),
            index: turn.index,
            timestamp: Utc::now(),
        });

        if self.maintainer.extractor.is_some() {
            self.enqueue(MaintenanceJob::ExtractFacts(turn.clone()));
        }
        if should_summarize
            && !self.summarize_queued.swap(true, Ordering::SeqCst)
            && !self.enqueue(MaintenanceJob::Summarize)
        {
            self.summarize_queued.store(false, Ordering::SeqCst);
        }

        Ok(turn)
    }

    /// Append a user query and assemble context for it.
    pub async fn ask(&self, query: impl Into<String>) -> Result<AssembledContext> {
        self.append(Role::User, query).await?;
        self.assemble().await
    }

    /// Assemble context for the latest turn from consistent snapshots.
    pub async fn assemble(&self) -> Result<AssembledContext> {
        // Maintenance applies its writes under the gate's write guard, so the
        // three copies below see either all or none of a job's results.
        let (turns, facts, memory) = {
            let closed = self.closed.read().await;
            if *closed {
                return Err(Error::Closed(self.id.to_string()));
            }
            (
                self.turns().await,
                self.facts.snapshot().await,
                self.memory.snapshot().await,
            )
        };
        let recall = self.recall(&turns, &memory).await;

        let context = self.assembler.assemble(&AssemblyInput {
            facts: &facts,
            recall: &recall,
            turns: &turns,
        });

        debug!(
            conversation = %self.id,
            tokens = context.metadata.total_tokens,
            budget = context.metadata.budget,
            facts = context.facts.len(),
            memory = context.memory.len(),
            recent = context.recent.len(),
            "Context assembled"
        );
        self.events.publish(DomainEvent::ContextAssembled {
            conversation_id: self.id.to_string(),
            query_index: context.query().map(|t| t.index).unwrap_or(0),
            total_tokens: context.metadata.total_tokens,
            over_budget: context.metadata.over_budget,
            timestamp: Utc::now(),
        });

        Ok(context)
    }

    /// Wait for queued jobs, then summarize every eligible turn inline.
    pub async fn maintain_now(&self) -> Result<Vec<TurnRange>> {
        self.ensure_open().await?;

        let (tx, rx) = oneshot::channel();
        if self.jobs.send(MaintenanceJob::Barrier(tx)).await.is_ok() {
            // A dropped barrier means the worker stopped; nothing left to wait for.
            let _ = rx.await;
        }
        self.maintainer.flush().await
    }

    /// Tear the conversation down. Facts and memory are cleared and any
    /// maintenance still running is discarded when it completes.
    pub async fn close(&self) -> Result<()> {
        {
            let mut closed = self.closed.write().await;
            if *closed {
                return Ok(());
            }
            *closed = true;
            self.facts.clear().await;
            self.memory.clear().await;
        }
        let _ = self.shutdown.send(true);

        info!(conversation = %self.id, "Conversation closed");
        self.events.publish(DomainEvent::ConversationClosed {
            conversation_id: self.id.to_string(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn ensure_open(&self) -> Result<()> {
        if self.is_closed().await {
            return Err(Error::Closed(self.id.to_string()));
        }
        Ok(())
    }

    /// Rank the snapshot against the query. Only the embedding call awaits.
    async fn recall(&self, turns: &[Turn], memory: &MemorySnapshot) -> MemoryRecall {
        let Some(query) = turns.last() else {
            return MemoryRecall::NotNeeded;
        };
        if !self.assembler.needs_memory(turns) {
            return MemoryRecall::NotNeeded;
        }

        match self.memory.embed(&query.content).await {
            Ok(embedding) => MemoryRecall::Retrieved(memory.rank(
                &embedding,
                self.assembler.policy().retrieve_k,
                self.memory.min_similarity(),
            )),
            Err(e) => {
                warn!(conversation = %self.id, "Memory unavailable, assembling without it: {e}");
                MemoryRecall::NotReady(e.to_string())
            }
        }
    }

    fn enqueue(&self, job: MaintenanceJob) -> bool {
        match self.jobs.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => {
                warn!(conversation = %self.id, ?job, "Maintenance queue full, dropping job");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(conversation = %self.id, "Maintenance worker stopped");
                false
            }
        }
    }
}

async fn run_worker(
    maintainer: Arc<Maintainer>,
    mut jobs: mpsc::Receiver<MaintenanceJob>,
    mut shutdown: watch::Receiver<bool>,
    summarize_queued: Arc<AtomicBool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            job = jobs.recv() => {
                let Some(job) = job else { break };
                let result = match job {
                    MaintenanceJob::Summarize => {
                        let result = maintainer.run_summarization().await.map(|_| ());
                        summarize_queued.store(false, Ordering::SeqCst);
                        result
                    }
                    MaintenanceJob::ExtractFacts(turn) => {
                        maintainer.run_extraction(&turn).await.map(|_| ())
                    }
                    MaintenanceJob::Barrier(done) => {
                        let _ = done.send(());
                        Ok(())
                    }
                };
                if let Err(e) = result {
                    maintainer.report_failure(&e);
                }
            }
        }
    }
    debug!(conversation = %maintainer.conversation_id, "Maintenance worker exited");
}
