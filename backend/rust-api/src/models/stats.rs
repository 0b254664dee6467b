use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cached per-student aggregate. Counters are maintained by atomic
/// increments; the whole record is recomputable from submission history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentStats {
    pub quizzes_taken: u64,
    pub total_score: u64,
    pub average_score: u32,
    pub topics_completed: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubjectPerformance {
    pub attempts: u64,
    pub total_score: u64,
    pub average_score: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentScore {
    pub date: DateTime<Utc>,
    pub score: u8,
    pub subject: String,
    pub topic: Option<String>,
}

/// Per-student performance summary as served to the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentPerformance {
    pub quizzes_taken: u64,
    pub average_score: u32,
    pub subject_performance: BTreeMap<String, SubjectPerformance>,
    pub recent_scores: Vec<RecentScore>,
}

/// Cohort-wide rollup across many students.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortSummary {
    pub total_submissions: u64,
    pub average_score: u32,
    pub average_time_taken: u32,
    pub subject_performance: BTreeMap<String, SubjectPerformance>,
    pub class_performance: BTreeMap<String, SubjectPerformance>,
}

/// Filter for cohort queries and admin attempt listings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptFilter {
    pub class: Option<u8>,
    pub subject: Option<String>,
    pub topic: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationKind {
    /// Weak recent performance in the subject.
    Improvement,
    /// Topic available in the bank but absent from recent attempts.
    New,
}

/// One suggested next quiz for a student.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(rename = "type")]
    pub kind: RecommendationKind,
    pub subject: String,
    pub topic: String,
    pub description: String,
}
