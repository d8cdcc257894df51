//! Report API Handler

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;

use super::ApiError;
use crate::models::ReportGenerateRequest;
use crate::services::report_builder::ReportInput;
use crate::AppState;

/// Render a PDF report for a cluster pair
/// POST /api/report/generate
pub async fn generate_report(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ReportGenerateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let input = ReportInput {
        parent_cluster_id: request.parent_cluster_id,
        child_cluster_id: request.child_cluster_id,
        discussion: request.discussion,
        answer: request.answer,
        rationale: request.rationale,
        key_metrics: request.key_metrics,
    };

    let pdf = state.report_builder.generate(&input).await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"meridian-report.pdf\""),
        ],
        pdf,
    ))
}
