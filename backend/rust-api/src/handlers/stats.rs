use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

use crate::{
    error::EngineError, middlewares::auth::JwtClaims, models::stats::AttemptFilter,
    services::AppState,
};

/// Per-student performance summary. Owner or admin.
pub async fn get_student_performance(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(student_id): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    if !claims.can_access(&student_id) {
        return Err(EngineError::Forbidden);
    }

    let performance = state
        .stats_aggregator()
        .student_performance(&student_id)
        .await?;

    Ok(Json(performance))
}

/// Cohort-wide rollup. Admin only (guarded at the router layer).
pub async fn get_cohort_summary(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<AttemptFilter>,
) -> Result<impl IntoResponse, EngineError> {
    let summary = state.stats_aggregator().cohort_summary(&filter).await?;
    Ok(Json(summary))
}
