use async_trait::async_trait;

use crate::error::EngineError;
use crate::models::stats::{AttemptFilter, StudentStats};
use crate::models::submission::Submission;
use crate::models::{Question, Stream};

pub mod mongo;
pub mod redis_cache;

/// Question-bank filter. `stream`/`topic` of `None` mean "do not filter".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionFilter {
    pub class: u8,
    pub stream: Option<Stream>,
    pub subject: String,
    pub topic: Option<String>,
}

impl QuestionFilter {
    /// Predicate form, shared by non-Mongo store implementations.
    /// Subject and topic match case-sensitively.
    pub fn matches(&self, question: &Question) -> bool {
        if question.class != self.class {
            return false;
        }
        if let Some(stream) = self.stream {
            if question.stream != stream {
                return false;
            }
        }
        if question.subject != self.subject {
            return false;
        }
        if let Some(ref topic) = self.topic {
            if &question.topic != topic {
                return false;
            }
        }
        true
    }
}

/// Durable question bank. Externally synchronized; single-document writes
/// are atomic at the store level.
#[async_trait]
pub trait QuestionStore: Send + Sync {
    async fn find(&self, filter: &QuestionFilter) -> Result<Vec<Question>, EngineError>;

    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Question>, EngineError>;

    async fn insert_many(&self, questions: &[Question]) -> Result<(), EngineError>;

    /// Distinct (subject, topic) pairs available for one class, optionally
    /// narrowed by stream. Feeds quiz recommendations.
    async fn subject_topics(
        &self,
        class: u8,
        stream: Option<Stream>,
    ) -> Result<Vec<(String, String)>, EngineError>;
}

/// Append-only submission archive, newest first on reads.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn insert(&self, submission: &Submission) -> Result<(), EngineError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Submission>, EngineError>;

    async fn find_by_student(
        &self,
        student_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Submission>, EngineError>;

    /// Filtered page plus the total match count (for pagination metadata).
    async fn find_filtered(
        &self,
        filter: &AttemptFilter,
        skip: u64,
        limit: Option<usize>,
    ) -> Result<(Vec<Submission>, u64), EngineError>;
}

/// Running per-student counters. `apply_submission` must use atomic
/// increment semantics, never read-modify-write on a stale snapshot.
#[async_trait]
pub trait StudentStatsStore: Send + Sync {
    async fn apply_submission(
        &self,
        student_id: &str,
        score: u8,
    ) -> Result<StudentStats, EngineError>;

    async fn write_snapshot(
        &self,
        student_id: &str,
        stats: &StudentStats,
    ) -> Result<(), EngineError>;

    async fn touch_last_active(&self, student_id: &str) -> Result<(), EngineError>;
}

/// Short-lived response cache backing submission idempotency.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, EngineError>;

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn question(class: u8, stream: Stream, subject: &str, topic: &str) -> Question {
        Question {
            id: "q".to_string(),
            class,
            stream,
            subject: subject.to_string(),
            topic: topic.to_string(),
            question_text: "?".to_string(),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_answer_index: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn filter_matches_class_and_subject_exactly() {
        let filter = QuestionFilter {
            class: 9,
            stream: None,
            subject: "Maths".to_string(),
            topic: None,
        };
        assert!(filter.matches(&question(9, Stream::None, "Maths", "Algebra")));
        assert!(!filter.matches(&question(10, Stream::None, "Maths", "Algebra")));
        // Subject comparison is case-sensitive.
        assert!(!filter.matches(&question(9, Stream::None, "maths", "Algebra")));
    }

    #[test]
    fn filter_ignores_stream_and_topic_when_unset() {
        let filter = QuestionFilter {
            class: 11,
            stream: None,
            subject: "Physics".to_string(),
            topic: None,
        };
        assert!(filter.matches(&question(11, Stream::Pcm, "Physics", "Optics")));
        assert!(filter.matches(&question(11, Stream::Pcb, "Physics", "Waves")));
    }

    #[test]
    fn filter_applies_stream_and_topic_when_set() {
        let filter = QuestionFilter {
            class: 12,
            stream: Some(Stream::Pcm),
            subject: "Physics".to_string(),
            topic: Some("Optics".to_string()),
        };
        assert!(filter.matches(&question(12, Stream::Pcm, "Physics", "Optics")));
        assert!(!filter.matches(&question(12, Stream::Pcb, "Physics", "Optics")));
        assert!(!filter.matches(&question(12, Stream::Pcm, "Physics", "Waves")));
    }
}
