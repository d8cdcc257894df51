//! Meridian Library
//!
//! This library contains all the core modules for the Meridian analytics
//! assistant backend.

use std::sync::Arc;

pub mod config;
pub mod db;
pub mod handlers;
pub mod models;
pub mod services;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use config::Config;
pub use services::agent::{
    AgentError, AgentEvent, AgentOrchestrator, ChatMode, ClusterPredictor, EventType,
    LanguageModel, OpenAiCompatClient,
};
pub use services::{
    ArtifactStore, Catalog, EmbeddingIndex, ReportBuilder, VendorVoiceClient, VoiceService,
};

/// Application shared state
///
/// All services are shared read-mostly capabilities wrapped in Arc for cheap
/// cloning and thread safety; the artifact store's write-once cache is the
/// only shared mutable structure.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub artifact_store: Arc<ArtifactStore>,
    pub embedding_index: Arc<EmbeddingIndex>,
    pub llm: Arc<dyn LanguageModel>,
    pub orchestrator: Arc<AgentOrchestrator>,
    pub predictor: Arc<ClusterPredictor>,
    pub report_builder: Arc<ReportBuilder>,
    /// None when no voice credential is configured; voice endpoints answer 503
    pub voice: Option<Arc<dyn VoiceService>>,
}
