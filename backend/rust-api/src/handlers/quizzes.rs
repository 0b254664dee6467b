use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::{
    error::EngineError,
    middlewares::auth::JwtClaims,
    models::{submission::AttemptSummary, QuizConfiguration, Stream},
    services::AppState,
};

const RECENT_ATTEMPTS_LIMIT: usize = 5;

/// Assembled question list for the requested configuration. Answer keys
/// stay server-side.
pub async fn get_quiz_questions(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Query(config): Query<QuizConfiguration>,
) -> Result<impl IntoResponse, EngineError> {
    tracing::info!(
        "Assembling quiz for user={} class={} subject={}",
        claims.sub,
        config.class,
        config.subject
    );

    let quiz = state.quiz_assembler().assemble(&config).await?;
    state.stats_store().touch_last_active(&claims.sub).await?;

    Ok(Json(quiz.questions))
}

/// Ready-to-run session envelope: config echo, questions, server start
/// time and duration.
pub async fn get_random_quiz(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Query(config): Query<QuizConfiguration>,
) -> Result<impl IntoResponse, EngineError> {
    let quiz = state.quiz_assembler().assemble(&config).await?;
    state.stats_store().touch_last_active(&claims.sub).await?;

    if quiz.is_short() {
        tracing::warn!(
            "Serving degraded quiz: {} of {} questions for subject={}",
            quiz.questions.len(),
            quiz.config.question_count,
            quiz.config.subject
        );
    }

    Ok(Json(quiz))
}

/// Caller's most recent attempts.
pub async fn get_recent_attempts(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse, EngineError> {
    let submissions = state
        .submission_store()
        .find_by_student(&claims.sub, Some(RECENT_ATTEMPTS_LIMIT))
        .await?;

    let attempts: Vec<AttemptSummary> = submissions.iter().map(AttemptSummary::from_submission).collect();
    Ok(Json(attempts))
}

#[derive(Debug, Deserialize)]
pub struct RecommendationQuery {
    pub class: u8,
    pub stream: Option<Stream>,
}

/// Practice suggestions for the caller: weak subjects first, then bank
/// topics they have not attempted yet.
pub async fn get_recommendations(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Query(query): Query<RecommendationQuery>,
) -> Result<impl IntoResponse, EngineError> {
    let recommendations = state
        .stats_aggregator()
        .recommendations(&claims.sub, query.class, query.stream)
        .await?;

    Ok(Json(json!({ "recommendations": recommendations })))
}
