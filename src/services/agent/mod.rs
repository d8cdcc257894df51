//! Request-Orchestration Engine
//!
//! The two-stage reasoning pipeline and the session machinery around it:
//!
//! ```text
//! question ──> Orchestrator ──> Planner ──> ArtifactStore ──> Analyzer
//!                  │                                              │
//!                  ├──> ClusterPredictor (keywords -> embedding)  │
//!                  ▼                                              ▼
//!            event channel <───────── typed AgentEvents ──────────┘
//! ```
//!
//! The orchestrator owns one request at a time; everything it touches is a
//! shared read-mostly capability passed in by reference.

mod analyzer;
mod llm;
mod models;
mod orchestrator;
mod planner;
mod predictor;
pub mod prompts;

pub use llm::{LanguageModel, OpenAiCompatClient};
pub use models::{
    AccessEntry, AccessLog, AgentError, AgentEvent, AnalysisResult, ClusterPrediction, EventType,
    Plan, PlanEntry, MAX_PLAN_PRODUCTS,
};
pub use orchestrator::{AgentOrchestrator, ChatMode, EVENT_CHANNEL_CAPACITY};
pub use planner::Planner;
pub use predictor::ClusterPredictor;

#[allow(unused_imports)]
pub(crate) use analyzer::Analyzer;
