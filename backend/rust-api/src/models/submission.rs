use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{option_label, Stream};

/// Sentinel for a question the student never answered.
pub const UNANSWERED: i32 = -1;

/// One graded answer line. `correct_index` and `is_correct` are snapshotted
/// at grading time so the record stays valid if the question is later edited.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradedAnswer {
    pub question_id: String,
    pub selected_index: i32,
    pub correct_index: i32,
    pub is_correct: bool,
}

/// Append-only audit record of one graded quiz attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    #[serde(rename = "_id")]
    pub id: String,
    pub student_id: String,
    pub class: u8,
    /// Included only when a stream actually applies (class >= 11).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<Stream>,
    pub subject: String,
    pub topic: Option<String>,
    pub score: u8,
    pub time_taken_seconds: u32,
    pub questions: Vec<GradedAnswer>,
    pub created_at: DateTime<Utc>,
}

impl Submission {
    pub fn correct_count(&self) -> usize {
        self.questions.iter().filter(|q| q.is_correct).count()
    }
}

/// One submitted answer as sent by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedAnswer {
    pub question_id: String,
    #[serde(default = "unanswered")]
    pub selected_index: i32,
}

fn unanswered() -> i32 {
    UNANSWERED
}

/// Quiz submission request. `score` is advisory only: correctness and the
/// final score are recomputed server-side from the question bank.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitQuizRequest {
    pub questions: Vec<SubmittedAnswer>,
    #[serde(default)]
    pub score: Option<u8>,
    pub time_taken: u32,
    #[validate(range(min = 5, max = 12, message = "class must be between 5 and 12"))]
    pub class: u8,
    #[serde(default)]
    pub stream: Option<Stream>,
    #[validate(length(min = 1, message = "subject is required"))]
    pub subject: String,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// Display projection of one answer, keyed by question id on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAnswerView {
    pub selected_answer: Option<String>,
}

/// Enriched submission returned after grading.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionView {
    pub id: String,
    pub student_id: String,
    pub class: u8,
    pub stream: Option<Stream>,
    pub subject: String,
    pub topic: Option<String>,
    pub score: u8,
    pub time_taken_seconds: u32,
    pub answers: Vec<GradedAnswer>,
    pub user_answers: BTreeMap<String, UserAnswerView>,
    pub created_at: DateTime<Utc>,
}

impl SubmissionView {
    pub fn from_submission(submission: &Submission) -> Self {
        let user_answers = submission
            .questions
            .iter()
            .map(|q| {
                let selected = if q.selected_index >= 0 {
                    Some(option_label(q.selected_index as usize).to_string())
                } else {
                    None
                };
                (
                    q.question_id.clone(),
                    UserAnswerView {
                        selected_answer: selected,
                    },
                )
            })
            .collect();

        Self {
            id: submission.id.clone(),
            student_id: submission.student_id.clone(),
            class: submission.class,
            stream: submission.stream,
            subject: submission.subject.clone(),
            topic: submission.topic.clone(),
            score: submission.score,
            time_taken_seconds: submission.time_taken_seconds,
            answers: submission.questions.clone(),
            user_answers,
            created_at: submission.created_at,
        }
    }
}

/// Per-question breakdown for the post-hoc review endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewedAnswer {
    pub question: String,
    pub options: Vec<String>,
    pub selected_index: i32,
    pub correct_index: i32,
    pub is_correct: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReview {
    pub student_id: String,
    pub subject: String,
    pub topic: Option<String>,
    pub class: u8,
    pub stream: Option<Stream>,
    pub created_at: DateTime<Utc>,
    pub score: u8,
    pub time_taken_seconds: u32,
    pub stats: ReviewStats,
    pub answers: Vec<ReviewedAnswer>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewStats {
    pub total_questions: usize,
    pub correct_answers: usize,
    pub incorrect_answers: usize,
    pub percentage_correct: u8,
}

/// Compact row for attempt listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptSummary {
    pub id: String,
    pub student_id: String,
    pub score: u8,
    pub time_taken_seconds: u32,
    pub subject: String,
    pub topic: Option<String>,
    pub class: u8,
    pub question_count: usize,
    pub created_at: DateTime<Utc>,
}

impl AttemptSummary {
    pub fn from_submission(submission: &Submission) -> Self {
        Self {
            id: submission.id.clone(),
            student_id: submission.student_id.clone(),
            score: submission.score,
            time_taken_seconds: submission.time_taken_seconds,
            subject: submission.subject.clone(),
            topic: submission.topic.clone(),
            class: submission.class,
            question_count: submission.questions.len(),
            created_at: submission.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission() -> Submission {
        Submission {
            id: "s1".to_string(),
            student_id: "u1".to_string(),
            class: 10,
            stream: None,
            subject: "Maths".to_string(),
            topic: Some("Algebra".to_string()),
            score: 50,
            time_taken_seconds: 120,
            questions: vec![
                GradedAnswer {
                    question_id: "q1".to_string(),
                    selected_index: 2,
                    correct_index: 2,
                    is_correct: true,
                },
                GradedAnswer {
                    question_id: "q2".to_string(),
                    selected_index: UNANSWERED,
                    correct_index: 1,
                    is_correct: false,
                },
            ],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn user_answers_project_labels_and_skip_unanswered() {
        let view = SubmissionView::from_submission(&submission());
        assert_eq!(
            view.user_answers["q1"].selected_answer.as_deref(),
            Some("C")
        );
        assert_eq!(view.user_answers["q2"].selected_answer, None);
    }

    #[test]
    fn stream_is_omitted_from_wire_when_absent() {
        let json = serde_json::to_value(submission()).unwrap();
        assert!(json.get("stream").is_none());
    }

    #[test]
    fn attempt_summary_counts_questions() {
        let summary = AttemptSummary::from_submission(&submission());
        assert_eq!(summary.question_count, 2);
    }
}
