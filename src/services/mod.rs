pub mod agent;
pub mod artifact_store;
pub mod catalog;
pub mod embedding_index;
pub mod report_builder;
pub mod voice;

pub use agent::{
    AgentError, AgentEvent, AgentOrchestrator, AnalysisResult, ChatMode, ClusterPrediction,
    ClusterPredictor, EventType, LanguageModel, OpenAiCompatClient, Plan, PlanEntry,
};
pub use artifact_store::{Artifact, ArtifactStore, Summary};
pub use catalog::{Catalog, CatalogError, Product, RowFilter};
pub use embedding_index::{EmbeddingIndex, IndexError};
pub use report_builder::{ReportBuilder, ReportError, ReportInput, MAX_REPORT_CHARTS};
pub use voice::{
    AudioFormat, SttStreamEvent, TtsWithTimestamps, VendorVoiceClient, VoiceError, VoiceService,
    WordTimestamp,
};
