// Common test utilities and helpers

use async_trait::async_trait;
use axum::routing::{get, post};
use axum::Router;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AgentConfig;
use crate::services::agent::{
    AgentError, AgentOrchestrator, ClusterPredictor, LanguageModel,
};
use crate::services::catalog::Product;
use crate::services::{ArtifactStore, Catalog, EmbeddingIndex, ReportBuilder};
use crate::{handlers, AppState};

/// Canned language model for router-level tests. The single JSON object
/// carries both the planner's and the analyzer's keys; each stage
/// deserializes the fields it knows and ignores the rest.
pub struct StubLlm;

#[async_trait]
impl LanguageModel for StubLlm {
    async fn generate_text(&self, _prompt: &str) -> Result<String, AgentError> {
        Ok("stub reply".to_string())
    }

    async fn generate_json(
        &self,
        _prompt: &str,
        _schema_hint: &str,
    ) -> Result<serde_json::Value, AgentError> {
        Ok(serde_json::json!({
            "products": [
                { "product_id": "top10_volume_30d", "reason": "volume question" }
            ],
            "answer": "Potholes lead with 120 requests over 30 days.",
            "rationale": ["Potholes: 120 requests", "Streetlights: 88 requests"],
            "key_metrics": ["120 pothole requests"]
        }))
    }

    async fn generate_search_keywords(&self, _question: &str) -> Result<String, AgentError> {
        Ok("streetlight, king street".to_string())
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, AgentError> {
        Ok(vec![1.0, 0.0])
    }
}

/// Holds the artifact directory alive for the duration of a test
pub struct TestContext {
    pub _tmp: tempfile::TempDir,
    pub state: Arc<AppState>,
}

/// Create an AppState backed by the stub model, a one-product catalog, and
/// a two-level test index. Voice stays unconfigured.
pub fn create_test_state() -> TestContext {
    let tmp = tempfile::tempdir().expect("Failed to create temp dir");
    let mut file = std::fs::File::create(tmp.path().join("top10.csv"))
        .expect("Failed to create artifact fixture");
    file.write_all(b"category,count\nPotholes,120\nStreetlights,88\n")
        .expect("Failed to write artifact fixture");

    let catalog = Arc::new(
        Catalog::new(vec![Product {
            id: "top10_volume_30d".to_string(),
            description: "Top service categories by 30-day request volume".to_string(),
            use_cases: vec!["ranking categories".to_string()],
            key_metrics: vec!["request_count".to_string()],
            source_file: "top10.csv".to_string(),
            filter: None,
            route_hint: Some("/dashboard/analytics/frequency".to_string()),
        }])
        .expect("Failed to build test catalog"),
    );

    let artifact_store = Arc::new(ArtifactStore::new(
        tmp.path(),
        50,
        Duration::from_secs(5),
        Arc::clone(&catalog),
    ));

    let index = Arc::new(EmbeddingIndex::from_centroids(
        2,
        vec![(1, "roads".to_string(), Some("/backlog".to_string()), vec![1.0, 0.0])],
        vec![(10, 1, "potholes".to_string(), vec![1.0, 0.0])],
    ));

    let llm: Arc<dyn LanguageModel> = Arc::new(StubLlm);

    let orchestrator = Arc::new(
        AgentOrchestrator::new(
            Arc::clone(&catalog),
            Arc::clone(&artifact_store),
            Arc::clone(&index),
            Arc::clone(&llm),
            &AgentConfig::default(),
            24_000,
            String::new(),
        )
        .expect("Failed to build orchestrator"),
    );

    let predictor = Arc::new(ClusterPredictor::new(Arc::clone(&llm), Arc::clone(&index)));
    let report_builder = Arc::new(ReportBuilder::new(
        Arc::clone(&catalog),
        Arc::clone(&artifact_store),
        Arc::clone(&index),
    ));

    let state = Arc::new(AppState {
        catalog,
        artifact_store,
        embedding_index: index,
        llm,
        orchestrator,
        predictor,
        report_builder,
        voice: None,
    });

    TestContext { _tmp: tmp, state }
}

/// Test router wired with the real handlers
pub fn create_test_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/chat", post(handlers::chat::chat))
        .route("/api/cluster/predict", post(handlers::chat::predict_cluster))
        .route("/api/chat/analytics-visit", post(handlers::chat::analytics_visit))
        .route("/api/voice/tts", post(handlers::voice::tts))
        .route("/api/voice/stt", post(handlers::voice::stt))
        .with_state(state)
}
