use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    error::EngineError,
    middlewares::auth::JwtClaims,
    models::{
        stats::AttemptFilter,
        submission::{
            AttemptSummary, ReviewStats, ReviewedAnswer, SubmissionReview, SubmissionView,
            SubmitQuizRequest,
        },
    },
    services::AppState,
};

/// Grade and persist a quiz attempt. The response carries the
/// authoritative per-question correctness, never the client's claim.
pub async fn submit_quiz(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Json(req): Json<SubmitQuizRequest>,
) -> Result<impl IntoResponse, EngineError> {
    tracing::info!(
        "Grading submission for user={} subject={} questions={}",
        claims.sub,
        req.subject,
        req.questions.len()
    );

    let submission = state.grading_engine().grade(&claims.sub, &req).await?;
    state.stats_store().touch_last_active(&claims.sub).await?;

    Ok((
        StatusCode::CREATED,
        Json(SubmissionView::from_submission(&submission)),
    ))
}

/// All attempts for one student, newest first. Owner or admin.
pub async fn get_user_submissions(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    if !claims.can_access(&user_id) {
        return Err(EngineError::Forbidden);
    }

    let submissions = state
        .submission_store()
        .find_by_student(&user_id, None)
        .await?;

    let attempts: Vec<AttemptSummary> = submissions.iter().map(AttemptSummary::from_submission).collect();
    Ok(Json(attempts))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub class: Option<u8>,
    pub subject: Option<String>,
    pub topic: Option<String>,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 {
    1
}

fn default_limit() -> u64 {
    20
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub total_pages: u64,
}

/// Admin listing of all attempts with filters and pagination.
pub async fn list_submissions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, EngineError> {
    let filter = AttemptFilter {
        class: query.class,
        subject: query.subject.clone(),
        topic: query.topic.clone(),
    };
    let page = query.page.max(1);
    let limit = query.limit.clamp(1, 100);
    let skip = (page - 1) * limit;

    let (submissions, total) = state
        .submission_store()
        .find_filtered(&filter, skip, Some(limit as usize))
        .await?;

    let attempts: Vec<AttemptSummary> = submissions.iter().map(AttemptSummary::from_submission).collect();

    Ok(Json(json!({
        "attempts": attempts,
        "pagination": Pagination {
            page,
            limit,
            total,
            total_pages: total.div_ceil(limit),
        },
    })))
}

/// Post-hoc review of one attempt: question text, options and the graded
/// outcome per entry. Questions deleted since grading are dropped from
/// the breakdown; the snapshot totals still cover the full attempt.
pub async fn get_submission_answers(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(submission_id): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    let submission = state
        .submission_store()
        .find_by_id(&submission_id)
        .await?
        .ok_or_else(|| EngineError::NotFound("Submission".to_string()))?;

    if !claims.can_access(&submission.student_id) {
        return Err(EngineError::Forbidden);
    }

    let ids: Vec<String> = submission
        .questions
        .iter()
        .map(|a| a.question_id.clone())
        .collect();
    let resolved = state.question_store().find_by_ids(&ids).await?;
    let by_id: HashMap<&str, _> = resolved.iter().map(|q| (q.id.as_str(), q)).collect();

    let answers: Vec<ReviewedAnswer> = submission
        .questions
        .iter()
        .filter_map(|graded| {
            by_id.get(graded.question_id.as_str()).map(|question| ReviewedAnswer {
                question: question.question_text.clone(),
                options: question.options.clone(),
                selected_index: graded.selected_index,
                correct_index: graded.correct_index,
                is_correct: graded.is_correct,
            })
        })
        .collect();

    let total = submission.questions.len();
    let correct = submission.correct_count();

    Ok(Json(SubmissionReview {
        student_id: submission.student_id.clone(),
        subject: submission.subject.clone(),
        topic: submission.topic.clone(),
        class: submission.class,
        stream: submission.stream,
        created_at: submission.created_at,
        score: submission.score,
        time_taken_seconds: submission.time_taken_seconds,
        stats: ReviewStats {
            total_questions: total,
            correct_answers: correct,
            incorrect_answers: total - correct,
            percentage_correct: submission.score,
        },
        answers,
    }))
}
