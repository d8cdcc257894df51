//! Session Orchestrator
//!
//! Drives one request: routes the question to simple chat or deep analysis,
//! emits the typed event stream over a bounded channel, and invokes the
//! planner, artifact store, analyzer, and cluster predictor in order.
//!
//! Event ordering is part of the contract. Within a session events are
//! strictly ordered; `complete` and `error` are terminal. The channel is
//! bounded, so a slow client applies backpressure to upstream LLM work, and
//! a dropped receiver (client disconnect) stops the session at the next
//! emission or checkpoint.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::analyzer::Analyzer;
use super::llm::LanguageModel;
use super::models::{AccessLog, AgentError, AgentEvent};
use super::planner::Planner;
use super::predictor::ClusterPredictor;
use super::prompts;
use crate::config::AgentConfig;
use crate::services::artifact_store::ArtifactStore;
use crate::services::catalog::Catalog;
use crate::services::embedding_index::EmbeddingIndex;

/// Bounded SSE event channel between the orchestrator and the transport
pub const EVENT_CHANNEL_CAPACITY: usize = 16;

/// How a session routes the question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatMode {
    /// Confirm before deep analysis when the question asks for one
    #[default]
    Auto,
    Chat,
    DeepAnalysis,
}

/// Receiver dropped mid-session: the client disconnected. Not an error;
/// the session simply stops without emitting `complete`.
struct Disconnected;

struct EventSink {
    tx: mpsc::Sender<AgentEvent>,
}

impl EventSink {
    async fn emit(&self, event: AgentEvent) -> Result<(), Disconnected> {
        self.tx.send(event).await.map_err(|_| Disconnected)
    }

    fn cancelled(&self) -> bool {
        self.tx.is_closed()
    }

    /// Cancellation checkpoint between numbered pipeline steps
    fn checkpoint(&self) -> Result<(), Disconnected> {
        if self.cancelled() { Err(Disconnected) } else { Ok(()) }
    }
}

pub struct AgentOrchestrator {
    catalog: Arc<Catalog>,
    artifacts: Arc<ArtifactStore>,
    llm: Arc<dyn LanguageModel>,
    planner: Planner,
    analyzer: Analyzer,
    predictor: ClusterPredictor,
    analysis_pattern: Regex,
    domain_pattern: Regex,
    deep_research_pattern: Regex,
}

impl AgentOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: Arc<Catalog>,
        artifacts: Arc<ArtifactStore>,
        index: Arc<EmbeddingIndex>,
        llm: Arc<dyn LanguageModel>,
        agent_config: &AgentConfig,
        input_budget_chars: usize,
        sample_context: String,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            planner: Planner::new(Arc::clone(&llm), Arc::clone(&catalog), sample_context),
            analyzer: Analyzer::new(Arc::clone(&llm), input_budget_chars),
            predictor: ClusterPredictor::new(Arc::clone(&llm), index),
            catalog,
            artifacts,
            llm,
            analysis_pattern: Regex::new(r"(?i)\banalysis\b")?,
            domain_pattern: Regex::new(&agent_config.domain_token_pattern)?,
            deep_research_pattern: Regex::new(&agent_config.deep_research_pattern)?,
        })
    }

    /// Start one session. Returns the receiving side of its event stream;
    /// dropping the receiver cancels the session.
    pub fn run(self: Arc<Self>, question: String, mode: ChatMode) -> mpsc::Receiver<AgentEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let session_id = Uuid::new_v4();

        tokio::spawn(async move {
            let sink = EventSink { tx };
            tracing::info!("session {} started (mode {:?})", session_id, mode);
            match self.drive(&question, mode, &sink).await {
                Ok(()) => tracing::info!("session {} finished", session_id),
                Err(Disconnected) => {
                    tracing::debug!("session {} cancelled by client", session_id)
                },
            }
        });

        rx
    }

    /// Run a session to completion and collect every event. Backs the
    /// non-streaming `/api/chat` endpoint.
    pub async fn run_collected(
        self: Arc<Self>,
        question: String,
        mode: ChatMode,
    ) -> Vec<AgentEvent> {
        let mut rx = self.run(question, mode);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    async fn drive(
        &self,
        question: &str,
        mode: ChatMode,
        sink: &EventSink,
    ) -> Result<(), Disconnected> {
        match mode {
            ChatMode::DeepAnalysis => self.run_deep_analysis(question, sink).await,
            ChatMode::Chat => self.run_chat(question, sink).await,
            ChatMode::Auto => {
                if self.analysis_pattern.is_match(question) {
                    self.run_confirmation(question, sink).await
                } else {
                    self.run_chat(question, sink).await
                }
            },
        }
    }

    /// Planning -> per-product loading (with at-most-one navigation) ->
    /// analysis -> cluster prediction -> complete.
    async fn run_deep_analysis(
        &self,
        question: &str,
        sink: &EventSink,
    ) -> Result<(), Disconnected> {
        sink.emit(AgentEvent::user(question)).await?;

        sink.emit(AgentEvent::thought("Planning")).await?;
        let plan = match self.planner.plan(question).await {
            Ok(plan) => plan,
            Err(e) => return self.fail(sink, e).await,
        };
        sink.emit(AgentEvent::plan(&plan)).await?;
        sink.checkpoint()?;

        let mut access_log = AccessLog::default();
        let mut summaries = Vec::with_capacity(plan.entries.len());
        let mut navigated = false;

        for entry in &plan.entries {
            sink.emit(AgentEvent::thought(format!("Loading {}", entry.product_id)))
                .await?;

            let summary = match self.artifacts.load_summary(&entry.product_id).await {
                Ok(summary) => summary,
                Err(e) => return self.fail(sink, e).await,
            };
            access_log.record(&entry.product_id, summary.shape, true);
            summaries.push(summary);

            // The page transition must precede `answer` so the user's chart
            // view is ready; emitted once, for the first product that has a
            // route hint.
            if !navigated {
                if let Ok(product) = self.catalog.get(&entry.product_id) {
                    if let Some(url) = &product.route_hint {
                        sink.emit(AgentEvent::navigation(url)).await?;
                        navigated = true;
                    }
                }
            }
        }
        sink.checkpoint()?;

        sink.emit(AgentEvent::thought("Analyzing")).await?;
        let result = match self.analyzer.analyze(question, &access_log, &summaries).await {
            Ok(result) => result,
            Err(e) => return self.fail(sink, e).await,
        };
        sink.emit(AgentEvent::answer(&result)).await?;
        sink.checkpoint()?;

        // Predicted after the answer so the UI can highlight matching
        // clusters once the chart is on screen; only for questions that
        // name a request domain
        if self.domain_pattern.is_match(question) {
            match self.predictor.predict(question).await {
                Ok(prediction) => {
                    sink.emit(AgentEvent::cluster_prediction(&prediction)).await?
                },
                Err(e) => return self.fail(sink, e).await,
            }
        }

        sink.emit(AgentEvent::complete()).await
    }

    /// Direct persona reply; domain-token follow-ups get a cluster
    /// prediction first and deep-research follow-ups get the glow hint.
    async fn run_chat(&self, question: &str, sink: &EventSink) -> Result<(), Disconnected> {
        sink.emit(AgentEvent::user(question)).await?;

        if self.domain_pattern.is_match(question) {
            match self.predictor.predict(question).await {
                Ok(prediction) => {
                    sink.emit(AgentEvent::cluster_prediction(&prediction)).await?
                },
                Err(e) => return self.fail(sink, e).await,
            }
        }

        if self.deep_research_pattern.is_match(question) {
            sink.emit(AgentEvent::glow_on()).await?;
        }
        sink.checkpoint()?;

        let reply = match self.llm.generate_text(&prompts::build_chat_prompt(question)).await {
            Ok(reply) => reply,
            Err(e) => return self.fail(sink, e).await,
        };
        sink.emit(AgentEvent::chat(reply)).await?;

        sink.emit(AgentEvent::complete()).await
    }

    /// Auto mode saw the analysis keyword: ask the client to confirm and
    /// close. The client re-posts the question with an explicit mode; no
    /// state is held across requests.
    async fn run_confirmation(&self, question: &str, sink: &EventSink) -> Result<(), Disconnected> {
        sink.emit(AgentEvent::user(question)).await?;
        sink.emit(AgentEvent::confirmation("Deep analysis?")).await?;
        Ok(())
    }

    /// `error` is itself terminal: no `complete` after it
    async fn fail(&self, sink: &EventSink, err: AgentError) -> Result<(), Disconnected> {
        tracing::warn!("session failed: {} ({})", err, err.kind());
        sink.emit(AgentEvent::error(&err)).await
    }
}
