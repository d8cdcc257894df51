//! Agent Data Models
//!
//! Core data structures for the request-orchestration engine: the typed
//! event stream, planner and analyzer outputs, cluster predictions, and the
//! agent error taxonomy.

use serde::{Deserialize, Serialize};

// ============================================================================
// Event Stream Types
// ============================================================================

/// Tagged event type streamed to the dashboard. The wire name drives UI
/// transitions (navigation, chart highlighting, subtitles, report display).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    User,
    Thought,
    Plan,
    Navigation,
    Answer,
    Chat,
    Confirmation,
    ClusterPrediction,
    GlowOn,
    Complete,
    Error,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Thought => "thought",
            Self::Plan => "plan",
            Self::Navigation => "navigation",
            Self::Answer => "answer",
            Self::Chat => "chat",
            Self::Confirmation => "confirmation",
            Self::ClusterPrediction => "cluster_prediction",
            Self::GlowOn => "glow_on",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

/// One event on a session's stream. Serialized as a single-line JSON object
/// `{type, content, data?}` inside an SSE `data:` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl AgentEvent {
    fn new(event_type: EventType, content: impl Into<String>) -> Self {
        Self { event_type, content: content.into(), data: None }
    }

    fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn user(question: &str) -> Self {
        Self::new(EventType::User, question)
    }

    pub fn thought(content: impl Into<String>) -> Self {
        Self::new(EventType::Thought, content)
    }

    pub fn plan(plan: &Plan) -> Self {
        let data = serde_json::to_value(plan).unwrap_or(serde_json::Value::Null);
        Self::new(EventType::Plan, plan.describe()).with_data(data)
    }

    pub fn navigation(url: &str) -> Self {
        Self::new(EventType::Navigation, url)
            .with_data(serde_json::json!({ "url": url }))
    }

    pub fn answer(result: &AnalysisResult) -> Self {
        let data = serde_json::to_value(result).unwrap_or(serde_json::Value::Null);
        Self::new(EventType::Answer, result.answer.clone()).with_data(data)
    }

    pub fn chat(content: impl Into<String>) -> Self {
        Self::new(EventType::Chat, content)
    }

    pub fn confirmation(content: impl Into<String>) -> Self {
        Self::new(EventType::Confirmation, content)
    }

    pub fn cluster_prediction(prediction: &ClusterPrediction) -> Self {
        let data = serde_json::to_value(prediction).unwrap_or(serde_json::Value::Null);
        Self::new(
            EventType::ClusterPrediction,
            format!(
                "cluster {} / {}",
                prediction.parent_id, prediction.child_id
            ),
        )
        .with_data(data)
    }

    pub fn glow_on() -> Self {
        Self::new(EventType::GlowOn, "deep research mode")
    }

    pub fn complete() -> Self {
        Self::new(EventType::Complete, "done")
    }

    pub fn error(err: &AgentError) -> Self {
        Self::new(EventType::Error, err.to_string())
            .with_data(serde_json::json!({ "kind": err.kind(), "message": err.to_string() }))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.event_type, EventType::Complete | EventType::Error)
    }
}

// ============================================================================
// Planner Output
// ============================================================================

/// Upper bound on products a single plan may consult
pub const MAX_PLAN_PRODUCTS: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanEntry {
    pub product_id: String,
    pub reason: String,
}

/// Ordered product choice produced by the planner, 1-3 entries, every id
/// resolvable in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub entries: Vec<PlanEntry>,
}

impl Plan {
    pub fn describe(&self) -> String {
        let ids: Vec<&str> = self.entries.iter().map(|e| e.product_id.as_str()).collect();
        format!("Consulting {}", ids.join(", "))
    }

    pub fn product_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.product_id.as_str())
    }
}

// ============================================================================
// Analyzer Output
// ============================================================================

/// Structured answer grounded in the loaded summaries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// One concise sentence
    pub answer: String,
    /// 3-7 bullets citing numbers from the fetched artifacts
    pub rationale: Vec<String>,
    /// Short metric strings, may be empty
    #[serde(default)]
    pub key_metrics: Vec<String>,
}

// ============================================================================
// Access Log
// ============================================================================

/// Record of one product actually fetched for a session
#[derive(Debug, Clone, Serialize)]
pub struct AccessEntry {
    pub product_id: String,
    /// (rows, columns) if known
    pub shape: Option<(usize, usize)>,
    pub used_summary: bool,
}

/// Ordered record of products fetched during deep analysis
#[derive(Debug, Clone, Default, Serialize)]
pub struct AccessLog {
    pub entries: Vec<AccessEntry>,
}

impl AccessLog {
    pub fn record(&mut self, product_id: &str, shape: Option<(usize, usize)>, used_summary: bool) {
        self.entries.push(AccessEntry {
            product_id: product_id.to_string(),
            shape,
            used_summary,
        });
    }
}

// ============================================================================
// Cluster Prediction
// ============================================================================

/// Nearest level-1 / level-2 cluster pair for a question
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterPrediction {
    pub parent_id: i64,
    pub child_id: i64,
    /// In (0, 1]
    pub confidence: f64,
}

// ============================================================================
// Agent Error Types
// ============================================================================

/// Every in-stream fault maps to exactly one kind; the kind string is what
/// the client renders on its red error card.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("unknown product: {0}")]
    UnknownProduct(String),

    #[error("artifact unavailable: {0}")]
    ArtifactUnavailable(String),

    #[error("planner produced no valid product selection")]
    PlanningFailed,

    #[error("LLM returned malformed output: {0}")]
    LlmParse(String),

    #[error("transient LLM failure: {0}")]
    LlmTransient(String),

    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    Dimension { expected: usize, got: usize },
}

impl AgentError {
    /// Stable kind tag surfaced in `error` events and JSON error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownProduct(_) => "UnknownProduct",
            Self::ArtifactUnavailable(_) => "ArtifactUnavailable",
            Self::PlanningFailed => "PlanningFailed",
            Self::LlmParse(_) => "LLMParseError",
            Self::LlmTransient(_) => "LLMTransient",
            Self::Dimension { .. } => "DimensionError",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LlmTransient(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_single_line() {
        let event = AgentEvent::thought("Planning");
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains('\n'));
        assert!(json.contains(r#""type":"thought""#));
        assert!(json.contains(r#""content":"Planning""#));
        // no data key when absent
        assert!(!json.contains(r#""data""#));
    }

    #[test]
    fn event_type_wire_names_are_snake_case() {
        let json = serde_json::to_string(&EventType::ClusterPrediction).unwrap();
        assert_eq!(json, r#""cluster_prediction""#);
        let json = serde_json::to_string(&EventType::GlowOn).unwrap();
        assert_eq!(json, r#""glow_on""#);
    }

    #[test]
    fn error_event_carries_kind_and_message() {
        let err = AgentError::ArtifactUnavailable("top10_volume_30d".to_string());
        let event = AgentEvent::error(&err);
        assert_eq!(event.event_type, EventType::Error);
        let data = event.data.unwrap();
        assert_eq!(data["kind"], "ArtifactUnavailable");
        assert!(data["message"].as_str().unwrap().contains("top10_volume_30d"));
    }

    #[test]
    fn terminal_events() {
        assert!(AgentEvent::complete().is_terminal());
        assert!(AgentEvent::error(&AgentError::PlanningFailed).is_terminal());
        assert!(!AgentEvent::thought("Analyzing").is_terminal());
    }

    #[test]
    fn plan_describe_lists_ids_in_order() {
        let plan = Plan {
            entries: vec![
                PlanEntry { product_id: "a".into(), reason: "first".into() },
                PlanEntry { product_id: "b".into(), reason: "second".into() },
            ],
        };
        assert_eq!(plan.describe(), "Consulting a, b");
    }
}
