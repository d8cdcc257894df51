//! API Models
//!
//! Request and response bodies for the HTTP surface. The event stream types
//! themselves live with the agent (`services::agent`); these are the thin
//! wrappers the transport parses and serializes.

use serde::{Deserialize, Serialize};

use crate::services::agent::{AgentEvent, ChatMode};
use crate::services::voice::WordTimestamp;

// ============================================================================
// Chat
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub mode: ChatMode,
}

/// Merged, non-streaming variant of a session's event stream
#[derive(Debug, Serialize)]
pub struct ChatTranscript {
    pub events: Vec<AgentEvent>,
}

// ============================================================================
// Cluster prediction / analytics visit
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ClusterPredictRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ClusterPredictResponse {
    pub parent_cluster_id: i64,
    pub child_cluster_id: i64,
    pub confidence: f64,
}

#[derive(Debug, Deserialize)]
pub struct AnalyticsVisitRequest {
    pub parent_cluster_id: i64,
    pub child_cluster_id: i64,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsVisitResponse {
    pub url: String,
    pub discussion: String,
}

// ============================================================================
// Report
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ReportGenerateRequest {
    pub parent_cluster_id: i64,
    pub child_cluster_id: i64,
    #[serde(default)]
    pub discussion: String,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub rationale: Vec<String>,
    #[serde(default)]
    pub key_metrics: Vec<String>,
}

// ============================================================================
// Voice
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TtsApiRequest {
    pub text: String,
    #[serde(default)]
    pub voice_id: Option<String>,
    pub output_format: String,
}

#[derive(Debug, Serialize)]
pub struct TtsWithTimestampsApiResponse {
    pub audio_base64: String,
    pub timestamps: Vec<WordTimestamp>,
}

#[derive(Debug, Deserialize)]
pub struct SttApiRequest {
    pub audio_base64: String,
    pub input_format: String,
}

#[derive(Debug, Serialize)]
pub struct SttApiResponse {
    pub transcript: String,
}

#[derive(Debug, Deserialize)]
pub struct SttStreamApiRequest {
    pub audio_chunk: String,
    #[serde(default)]
    pub is_final: bool,
    pub input_format: String,
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub agent_initialized: bool,
    pub voice_initialized: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_mode_defaults_to_auto() {
        let request: ChatRequest = serde_json::from_str(r#"{"message": "hi"}"#).unwrap();
        assert_eq!(request.mode, ChatMode::Auto);
    }

    #[test]
    fn chat_request_accepts_explicit_modes() {
        let request: ChatRequest =
            serde_json::from_str(r#"{"message": "hi", "mode": "deep_analysis"}"#).unwrap();
        assert_eq!(request.mode, ChatMode::DeepAnalysis);
        let request: ChatRequest =
            serde_json::from_str(r#"{"message": "hi", "mode": "chat"}"#).unwrap();
        assert_eq!(request.mode, ChatMode::Chat);
    }

    #[test]
    fn stt_stream_request_is_final_defaults_false() {
        let request: SttStreamApiRequest =
            serde_json::from_str(r#"{"audio_chunk": "AA==", "input_format": "pcm"}"#).unwrap();
        assert!(!request.is_final);
    }
}
