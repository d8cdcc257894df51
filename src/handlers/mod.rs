//! HTTP Handlers
//!
//! The transport surface: converts request bodies to orchestrator inputs and
//! typed events to SSE frames. Streaming endpoints answer 200 once the
//! stream opens and express later failures as events; non-streaming
//! endpoints answer standard statuses with a `{kind, message}` body.

pub mod chat;
pub mod health;
pub mod report;
pub mod voice;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::services::agent::AgentError;
use crate::services::report_builder::ReportError;
use crate::services::voice::VoiceError;

/// Error wrapper for non-streaming endpoints
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self { status, kind, message: message.into() }
    }

    pub fn unknown_cluster(parent: i64, child: i64) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "UnknownCluster",
            format!("unknown cluster pair: {}/{}", parent, child),
        )
    }

    pub fn voice_disabled() -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "VoiceDisabled",
            "voice service is not configured",
        )
    }
}

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        let status = match &err {
            AgentError::UnknownProduct(_) => StatusCode::NOT_FOUND,
            AgentError::ArtifactUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AgentError::PlanningFailed => StatusCode::UNPROCESSABLE_ENTITY,
            AgentError::LlmParse(_) => StatusCode::BAD_GATEWAY,
            AgentError::LlmTransient(_) => StatusCode::BAD_GATEWAY,
            AgentError::Dimension { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.kind(), err.to_string())
    }
}

impl From<VoiceError> for ApiError {
    fn from(err: VoiceError) -> Self {
        let status = match &err {
            VoiceError::UnsupportedFormat(_) => StatusCode::BAD_REQUEST,
            VoiceError::BadPayload(_) => StatusCode::BAD_REQUEST,
            VoiceError::Disabled => StatusCode::SERVICE_UNAVAILABLE,
            VoiceError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            VoiceError::ApiError(_) => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, err.kind(), err.to_string())
    }
}

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        match err {
            ReportError::UnknownCluster { parent, child } => Self::unknown_cluster(parent, child),
            ReportError::Artifact(inner) => inner.into(),
            ReportError::Render(message) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "RenderError", message)
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        if self.status.is_server_error() {
            tracing::error!("api error {}: {}", self.kind, self.message);
        }
        let body = Json(serde_json::json!({
            "kind": self.kind,
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}
