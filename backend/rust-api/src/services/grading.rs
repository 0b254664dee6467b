use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::error::EngineError;
use crate::metrics::SUBMISSIONS_GRADED_TOTAL;
use crate::models::submission::{GradedAnswer, SubmitQuizRequest, Submission};
use crate::models::{Stream, STREAM_CLASS_THRESHOLD};
use crate::stores::{QuestionStore, ResponseCache, SubmissionStore};

use super::stats::StatsAggregator;

const IDEMPOTENCY_TTL_SECONDS: u64 = 86_400;

/// Grades submissions against the authoritative question bank. Correctness
/// is recomputed here from live question state; any client-reported
/// correctness or score is ignored.
pub struct GradingEngine {
    questions: Arc<dyn QuestionStore>,
    submissions: Arc<dyn SubmissionStore>,
    stats: Arc<StatsAggregator>,
    cache: Arc<dyn ResponseCache>,
}

impl GradingEngine {
    pub fn new(
        questions: Arc<dyn QuestionStore>,
        submissions: Arc<dyn SubmissionStore>,
        stats: Arc<StatsAggregator>,
        cache: Arc<dyn ResponseCache>,
    ) -> Self {
        Self {
            questions,
            submissions,
            stats,
            cache,
        }
    }

    pub async fn grade(
        &self,
        student_id: &str,
        req: &SubmitQuizRequest,
    ) -> Result<Submission, EngineError> {
        req.validate()
            .map_err(|e| EngineError::Validation(e.to_string()))?;

        let cache_key = req
            .idempotency_key
            .as_ref()
            .map(|key| format!("idempotency:submission:{}:{}", student_id, key));

        if let Some(ref key) = cache_key {
            if let Some(cached) = self.cache.get(key).await? {
                tracing::info!("Returning cached submission for key={}", key);
                return Ok(serde_json::from_str(&cached)?);
            }
        }

        // Resolve every referenced question against the live bank. A
        // since-deleted question rejects the whole submission, it is never
        // silently scored wrong.
        let unique_ids: HashSet<&str> = req
            .questions
            .iter()
            .map(|a| a.question_id.as_str())
            .collect();
        let id_list: Vec<String> = unique_ids.iter().map(|id| id.to_string()).collect();
        let resolved = self.questions.find_by_ids(&id_list).await?;

        if resolved.len() != unique_ids.len() {
            SUBMISSIONS_GRADED_TOTAL.with_label_values(&["rejected"]).inc();
            let found: HashSet<&str> = resolved.iter().map(|q| q.id.as_str()).collect();
            let missing: Vec<&str> = unique_ids.difference(&found).copied().collect();
            return Err(EngineError::Validation(format!(
                "submission references unknown questions: {}",
                missing.join(", ")
            )));
        }

        let by_id: HashMap<&str, &crate::models::Question> =
            resolved.iter().map(|q| (q.id.as_str(), q)).collect();

        let graded: Vec<GradedAnswer> = req
            .questions
            .iter()
            .map(|answer| {
                let question = by_id[answer.question_id.as_str()];
                let correct_index = i32::from(question.correct_answer_index);
                GradedAnswer {
                    question_id: answer.question_id.clone(),
                    selected_index: answer.selected_index,
                    correct_index,
                    // Sole source of truth; unanswered (-1) never matches.
                    is_correct: answer.selected_index == correct_index,
                }
            })
            .collect();

        let correct_count = graded.iter().filter(|g| g.is_correct).count();
        let score = score_percent(correct_count, graded.len());

        if let Some(client_score) = req.score {
            if client_score != score {
                tracing::debug!(
                    "Ignoring client-reported score {} (server computed {})",
                    client_score,
                    score
                );
            }
        }

        let submission = Submission {
            id: Uuid::new_v4().to_string(),
            student_id: student_id.to_string(),
            class: req.class,
            stream: effective_submission_stream(req.class, req.stream),
            subject: req.subject.clone(),
            topic: req.topic.clone().filter(|t| !t.trim().is_empty()),
            score,
            time_taken_seconds: req.time_taken,
            questions: graded,
            created_at: Utc::now(),
        };

        // Append-only record first, then the stats rollup in the same
        // logical sequence.
        self.submissions.insert(&submission).await?;
        let stats = self.stats.record_submission(student_id, score).await?;

        SUBMISSIONS_GRADED_TOTAL.with_label_values(&["graded"]).inc();
        tracing::info!(
            "Graded submission {} for student {}: score={} quizzes_taken={}",
            submission.id,
            student_id,
            score,
            stats.quizzes_taken
        );

        // The submission is already durable at this point; a failed cache
        // write must not fail the call, or the client retries and gets
        // graded twice.
        if let Some(ref key) = cache_key {
            match serde_json::to_string(&submission) {
                Ok(json) => {
                    if let Err(e) = self.cache.set_ex(key, &json, IDEMPOTENCY_TTL_SECONDS).await {
                        tracing::warn!("Failed to cache graded submission for key={}: {}", key, e);
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to serialize graded submission for caching: {}", e);
                }
            }
        }

        Ok(submission)
    }
}

/// `round(100 * correct / total)`; an empty question set scores 0, never an
/// arithmetic error.
pub fn score_percent(correct: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    (100.0 * correct as f64 / total as f64).round() as u8
}

/// A stream is recorded on the submission only when it actually applies.
fn effective_submission_stream(class: u8, stream: Option<Stream>) -> Option<Stream> {
    match stream {
        Some(Stream::None) | None => None,
        Some(s) if class >= STREAM_CLASS_THRESHOLD => Some(s),
        Some(_) => None,
    }
}
