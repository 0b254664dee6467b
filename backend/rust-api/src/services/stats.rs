use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::EngineError;
use crate::models::stats::{
    AttemptFilter, CohortSummary, RecentScore, Recommendation, RecommendationKind,
    StudentPerformance, StudentStats, SubjectPerformance,
};
use crate::models::submission::Submission;
use crate::models::{Stream, STREAM_CLASS_THRESHOLD};
use crate::stores::{QuestionStore, StudentStatsStore, SubmissionStore};

const RECENT_SCORES_LIMIT: usize = 10;
const RECOMMENDATION_HISTORY: usize = 10;
const WEAK_SCORE_THRESHOLD: u8 = 60;
const MAX_NEW_TOPIC_RECOMMENDATIONS: usize = 3;
const MAX_RECOMMENDATIONS: usize = 5;

/// Incremental per-student rollup plus cross-student read aggregations.
/// The incremental counters must always agree with a full recompute over
/// the submission history.
pub struct StatsAggregator {
    submissions: Arc<dyn SubmissionStore>,
    stats: Arc<dyn StudentStatsStore>,
    questions: Arc<dyn QuestionStore>,
}

impl StatsAggregator {
    pub fn new(
        submissions: Arc<dyn SubmissionStore>,
        stats: Arc<dyn StudentStatsStore>,
        questions: Arc<dyn QuestionStore>,
    ) -> Self {
        Self {
            submissions,
            stats,
            questions,
        }
    }

    /// Atomic counter bump on the student record; called once per graded
    /// submission.
    pub async fn record_submission(
        &self,
        student_id: &str,
        score: u8,
    ) -> Result<StudentStats, EngineError> {
        self.stats.apply_submission(student_id, score).await
    }

    /// Full recompute over a student's submission history. Pure; the
    /// idempotence invariant is that this agrees with the incremental
    /// counters for the same history.
    pub fn recompute_from_history(submissions: &[Submission]) -> StudentStats {
        let quizzes_taken = submissions.len() as u64;
        let total_score: u64 = submissions.iter().map(|s| u64::from(s.score)).sum();
        let average_score = if quizzes_taken == 0 {
            0
        } else {
            (total_score as f64 / quizzes_taken as f64).round() as u32
        };
        let subjects: std::collections::BTreeSet<&str> =
            submissions.iter().map(|s| s.subject.as_str()).collect();

        StudentStats {
            quizzes_taken,
            total_score,
            average_score,
            topics_completed: subjects.len() as u32,
        }
    }

    /// Per-student performance summary. Also refreshes the cached stats
    /// snapshot on the student record from the full history.
    pub async fn student_performance(
        &self,
        student_id: &str,
    ) -> Result<StudentPerformance, EngineError> {
        let submissions = self.submissions.find_by_student(student_id, None).await?;

        if submissions.is_empty() {
            return Ok(StudentPerformance {
                quizzes_taken: 0,
                average_score: 0,
                subject_performance: BTreeMap::new(),
                recent_scores: Vec::new(),
            });
        }

        let stats = Self::recompute_from_history(&submissions);
        self.stats.write_snapshot(student_id, &stats).await?;

        let subject_performance =
            fold_performance(submissions.iter().map(|s| (s.subject.clone(), s.score)));

        let recent_scores = submissions
            .iter()
            .take(RECENT_SCORES_LIMIT)
            .map(|s| RecentScore {
                date: s.created_at,
                score: s.score,
                subject: s.subject.clone(),
                topic: s.topic.clone(),
            })
            .collect();

        Ok(StudentPerformance {
            quizzes_taken: stats.quizzes_taken,
            average_score: stats.average_score,
            subject_performance,
            recent_scores,
        })
    }

    /// Cohort-wide rollup. Pure read, no side effects.
    pub async fn cohort_summary(
        &self,
        filter: &AttemptFilter,
    ) -> Result<CohortSummary, EngineError> {
        let (submissions, total) = self.submissions.find_filtered(filter, 0, None).await?;

        if submissions.is_empty() {
            return Ok(CohortSummary {
                total_submissions: 0,
                average_score: 0,
                average_time_taken: 0,
                subject_performance: BTreeMap::new(),
                class_performance: BTreeMap::new(),
            });
        }

        let count = submissions.len() as f64;
        let average_score =
            (submissions.iter().map(|s| f64::from(s.score)).sum::<f64>() / count).round() as u32;
        let average_time_taken = (submissions
            .iter()
            .map(|s| f64::from(s.time_taken_seconds))
            .sum::<f64>()
            / count)
            .round() as u32;

        let subject_performance =
            fold_performance(submissions.iter().map(|s| (s.subject.clone(), s.score)));
        let class_performance =
            fold_performance(submissions.iter().map(|s| (s.class.to_string(), s.score)));

        Ok(CohortSummary {
            total_submissions: total,
            average_score,
            average_time_taken,
            subject_performance,
            class_performance,
        })
    }

    /// Suggests what to practice next. Subjects scored below the weak
    /// threshold in the recent history come first, then topics from the
    /// question bank the student has never attempted.
    pub async fn recommendations(
        &self,
        student_id: &str,
        class: u8,
        stream: Option<Stream>,
    ) -> Result<Vec<Recommendation>, EngineError> {
        let history = self
            .submissions
            .find_by_student(student_id, Some(RECOMMENDATION_HISTORY))
            .await?;

        let mut recommendations = Vec::new();
        let mut weak_subjects: std::collections::BTreeSet<&str> =
            std::collections::BTreeSet::new();
        for submission in &history {
            if submission.score < WEAK_SCORE_THRESHOLD
                && weak_subjects.insert(submission.subject.as_str())
            {
                recommendations.push(Recommendation {
                    kind: RecommendationKind::Improvement,
                    subject: submission.subject.clone(),
                    topic: String::new(),
                    description: format!(
                        "Practice {} to improve your score",
                        submission.subject
                    ),
                });
            }
        }

        let practiced: std::collections::BTreeSet<(String, String)> = history
            .iter()
            .filter_map(|s| {
                s.topic
                    .as_ref()
                    .map(|topic| (s.subject.clone(), topic.clone()))
            })
            .collect();

        // Stream only narrows the bank for senior classes.
        let effective_stream = match stream {
            Some(s) if class >= STREAM_CLASS_THRESHOLD && s != Stream::None => Some(s),
            _ => None,
        };

        let mut new_count = 0;
        for (subject, topic) in self.questions.subject_topics(class, effective_stream).await? {
            if new_count >= MAX_NEW_TOPIC_RECOMMENDATIONS {
                break;
            }
            if topic.is_empty() || practiced.contains(&(subject.clone(), topic.clone())) {
                continue;
            }
            recommendations.push(Recommendation {
                kind: RecommendationKind::New,
                description: format!("Try a quiz on {subject}: {topic}"),
                subject,
                topic,
            });
            new_count += 1;
        }

        recommendations.truncate(MAX_RECOMMENDATIONS);
        Ok(recommendations)
    }
}

/// Groups (key, score) pairs into attempt/total/average buckets.
pub fn fold_performance<I>(scores: I) -> BTreeMap<String, SubjectPerformance>
where
    I: IntoIterator<Item = (String, u8)>,
{
    let mut buckets: BTreeMap<String, SubjectPerformance> = BTreeMap::new();
    for (key, score) in scores {
        let bucket = buckets.entry(key).or_default();
        bucket.attempts += 1;
        bucket.total_score += u64::from(score);
        bucket.average_score = (bucket.total_score as f64 / bucket.attempts as f64).round() as u32;
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn submission(subject: &str, score: u8) -> Submission {
        Submission {
            id: uuid::Uuid::new_v4().to_string(),
            student_id: "u1".to_string(),
            class: 10,
            stream: None,
            subject: subject.to_string(),
            topic: None,
            score,
            time_taken_seconds: 60,
            questions: Vec::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn recompute_matches_hand_calculation() {
        let history = vec![
            submission("Maths", 80),
            submission("Maths", 60),
            submission("Physics", 100),
        ];
        let stats = StatsAggregator::recompute_from_history(&history);
        assert_eq!(stats.quizzes_taken, 3);
        assert_eq!(stats.total_score, 240);
        assert_eq!(stats.average_score, 80);
        assert_eq!(stats.topics_completed, 2);
    }

    #[test]
    fn recompute_of_empty_history_is_zeroed() {
        let stats = StatsAggregator::recompute_from_history(&[]);
        assert_eq!(stats, StudentStats::default());
    }

    #[test]
    fn fold_performance_averages_per_bucket() {
        let buckets = fold_performance(vec![
            ("Maths".to_string(), 70),
            ("Maths".to_string(), 90),
            ("Physics".to_string(), 50),
        ]);
        assert_eq!(buckets["Maths"].attempts, 2);
        assert_eq!(buckets["Maths"].average_score, 80);
        assert_eq!(buckets["Physics"].attempts, 1);
        assert_eq!(buckets["Physics"].average_score, 50);
    }
}
