//! Chat API Handlers
//!
//! The SSE chat stream, its merged non-streaming variant, cluster
//! prediction, and the analytics-visit endpoint.

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use super::ApiError;
use crate::models::{
    AnalyticsVisitRequest, AnalyticsVisitResponse, ChatRequest, ChatTranscript,
    ClusterPredictRequest, ClusterPredictResponse,
};
use crate::services::agent::{prompts, AgentEvent};
use crate::AppState;

/// Route shown when a cluster has no dedicated dashboard page
const DEFAULT_CLUSTER_ROUTE: &str = "/dashboard/analytics/frequency";

/// Stream one session as SSE
/// POST /api/chat/stream
pub async fn chat_stream(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = Arc::clone(&state.orchestrator).run(request.message, request.mode);
    let stream = ReceiverStream::new(rx).map(|event| Ok(sse_frame(&event)));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Run one session to completion and return every event in one object
/// POST /api/chat
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> impl IntoResponse {
    let events = Arc::clone(&state.orchestrator)
        .run_collected(request.message, request.mode)
        .await;
    Json(ChatTranscript { events })
}

/// Predict the request cluster a message belongs to
/// POST /api/cluster/predict
pub async fn predict_cluster(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ClusterPredictRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let prediction = state.predictor.predict(&request.message).await?;
    Ok(Json(ClusterPredictResponse {
        parent_cluster_id: prediction.parent_id,
        child_cluster_id: prediction.child_id,
        confidence: prediction.confidence,
    }))
}

/// Route and subtitle text for a cluster's dashboard page. Called by the
/// client after the answer's TTS finishes; the timing belongs to the UI.
/// POST /api/chat/analytics-visit
pub async fn analytics_visit(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnalyticsVisitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (parent_label, child_label) = state
        .embedding_index
        .labels(request.parent_cluster_id, request.child_cluster_id)
        .ok_or_else(|| {
            ApiError::unknown_cluster(request.parent_cluster_id, request.child_cluster_id)
        })?;

    let url = state
        .embedding_index
        .route_for(request.parent_cluster_id)
        .unwrap_or(DEFAULT_CLUSTER_ROUTE)
        .to_string();

    let discussion = state
        .llm
        .generate_text(&prompts::build_discussion_prompt(&parent_label, &child_label))
        .await?;

    Ok(Json(AnalyticsVisitResponse { url, discussion }))
}

/// Each event is one `data: <single-line JSON>` frame; clients split on the
/// blank line and parse per event.
fn sse_frame(event: &AgentEvent) -> Event {
    let json = serde_json::to_string(event).unwrap_or_else(|_| {
        r#"{"type":"error","content":"event serialization failed"}"#.to_string()
    });
    Event::default().data(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::agent::{AgentError, EventType};

    #[test]
    fn sse_frames_are_single_line_json() {
        let event = AgentEvent::thought("Loading top10_volume_30d");
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains('\n'));

        let parsed: AgentEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.event_type, EventType::Thought);
        assert_eq!(parsed.content, "Loading top10_volume_30d");
    }

    #[test]
    fn error_frames_round_trip_kind() {
        let event = AgentEvent::error(&AgentError::PlanningFailed);
        let json = serde_json::to_string(&event).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["type"], "error");
        assert_eq!(parsed["data"]["kind"], "PlanningFailed");
    }
}
