use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument};
use mongodb::{Collection, Database};

use crate::error::EngineError;
use crate::models::stats::{AttemptFilter, StudentStats};
use crate::models::submission::Submission;
use crate::models::{Question, Stream};
use crate::utils::time::now_bson;

use super::{QuestionFilter, QuestionStore, StudentStatsStore, SubmissionStore};

const QUESTIONS_COLLECTION: &str = "questions";
const SUBMISSIONS_COLLECTION: &str = "submissions";
const USERS_COLLECTION: &str = "users";

pub struct MongoQuestionStore {
    mongo: Database,
}

impl MongoQuestionStore {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    fn collection(&self) -> Collection<Question> {
        self.mongo.collection(QUESTIONS_COLLECTION)
    }

    fn filter_to_doc(filter: &QuestionFilter) -> Document {
        let mut doc = doc! {
            "class": i32::from(filter.class),
            "subject": &filter.subject,
        };
        if let Some(stream) = filter.stream {
            doc.insert("stream", stream.as_str());
        }
        if let Some(ref topic) = filter.topic {
            doc.insert("topic", topic);
        }
        doc
    }
}

#[async_trait]
impl QuestionStore for MongoQuestionStore {
    async fn find(&self, filter: &QuestionFilter) -> Result<Vec<Question>, EngineError> {
        let cursor = self.collection().find(Self::filter_to_doc(filter)).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Question>, EngineError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let cursor = self
            .collection()
            .find(doc! { "_id": { "$in": ids.to_vec() } })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn insert_many(&self, questions: &[Question]) -> Result<(), EngineError> {
        if questions.is_empty() {
            return Ok(());
        }
        self.collection().insert_many(questions).await?;
        tracing::info!("Persisted {} generated questions", questions.len());
        Ok(())
    }

    async fn subject_topics(
        &self,
        class: u8,
        stream: Option<Stream>,
    ) -> Result<Vec<(String, String)>, EngineError> {
        let mut match_doc = doc! { "class": i32::from(class) };
        if let Some(stream) = stream {
            match_doc.insert("stream", stream.as_str());
        }

        let pipeline = vec![
            doc! { "$match": match_doc },
            doc! { "$group": { "_id": { "subject": "$subject", "topic": "$topic" } } },
            doc! { "$sort": { "_id.subject": 1, "_id.topic": 1 } },
        ];

        let mut cursor = self.collection().aggregate(pipeline).await?;
        let mut pairs = Vec::new();
        while let Some(document) = cursor.try_next().await? {
            if let Ok(id) = document.get_document("_id") {
                pairs.push((
                    id.get_str("subject").unwrap_or_default().to_string(),
                    id.get_str("topic").unwrap_or_default().to_string(),
                ));
            }
        }
        Ok(pairs)
    }
}

pub struct MongoSubmissionStore {
    mongo: Database,
}

impl MongoSubmissionStore {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    fn collection(&self) -> Collection<Submission> {
        self.mongo.collection(SUBMISSIONS_COLLECTION)
    }

    fn attempt_filter_to_doc(filter: &AttemptFilter) -> Document {
        let mut doc = Document::new();
        if let Some(class) = filter.class {
            doc.insert("class", i32::from(class));
        }
        if let Some(ref subject) = filter.subject {
            doc.insert("subject", subject);
        }
        if let Some(ref topic) = filter.topic {
            doc.insert("topic", topic);
        }
        doc
    }
}

#[async_trait]
impl SubmissionStore for MongoSubmissionStore {
    async fn insert(&self, submission: &Submission) -> Result<(), EngineError> {
        self.collection().insert_one(submission).await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Submission>, EngineError> {
        Ok(self.collection().find_one(doc! { "_id": id }).await?)
    }

    async fn find_by_student(
        &self,
        student_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Submission>, EngineError> {
        let mut options = FindOptions::builder()
            .sort(doc! { "createdAt": -1 })
            .build();
        options.limit = limit.map(|l| l as i64);

        let cursor = self
            .collection()
            .find(doc! { "studentId": student_id })
            .with_options(options)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn find_filtered(
        &self,
        filter: &AttemptFilter,
        skip: u64,
        limit: Option<usize>,
    ) -> Result<(Vec<Submission>, u64), EngineError> {
        let filter_doc = Self::attempt_filter_to_doc(filter);
        let total = self
            .collection()
            .count_documents(filter_doc.clone())
            .await?;

        let mut options = FindOptions::builder()
            .sort(doc! { "createdAt": -1 })
            .skip(skip)
            .build();
        options.limit = limit.map(|l| l as i64);

        let cursor = self
            .collection()
            .find(filter_doc)
            .with_options(options)
            .await?;
        let submissions = cursor.try_collect().await?;
        Ok((submissions, total))
    }
}

/// Stats live under `stats.*` on the student document. Counters and the
/// derived average are written in one atomic pipeline update; a second
/// unconditioned write would let concurrent submissions persist an average
/// computed from stale counters.
pub struct MongoStudentStatsStore {
    mongo: Database,
}

impl MongoStudentStatsStore {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    fn collection(&self) -> Collection<Document> {
        self.mongo.collection(USERS_COLLECTION)
    }

    /// Single pipeline update: stage one bumps the counters, stage two
    /// derives `averageScore` from the counters stage one just wrote.
    fn apply_submission_pipeline(score: u8) -> Vec<Document> {
        vec![
            doc! { "$set": {
                "stats.quizzesTaken": {
                    "$add": [{ "$ifNull": ["$stats.quizzesTaken", 0] }, 1]
                },
                "stats.totalScore": {
                    "$add": [{ "$ifNull": ["$stats.totalScore", 0] }, i32::from(score)]
                },
                "lastActive": "$$NOW",
            } },
            doc! { "$set": {
                "stats.averageScore": {
                    "$round": [{ "$divide": ["$stats.totalScore", "$stats.quizzesTaken"] }, 0]
                },
            } },
        ]
    }

    fn read_counter(stats: &Document, field: &str) -> u64 {
        stats
            .get_i64(field)
            .or_else(|_| stats.get_i32(field).map(i64::from))
            .unwrap_or(0)
            .max(0) as u64
    }

    fn read_average(stats: &Document) -> u32 {
        stats
            .get_f64("averageScore")
            .map(|v| v.round() as i64)
            .or_else(|_| stats.get_i64("averageScore"))
            .or_else(|_| stats.get_i32("averageScore").map(i64::from))
            .unwrap_or(0)
            .max(0) as u32
    }
}

#[async_trait]
impl StudentStatsStore for MongoStudentStatsStore {
    async fn apply_submission(
        &self,
        student_id: &str,
        score: u8,
    ) -> Result<StudentStats, EngineError> {
        let updated = self
            .collection()
            .find_one_and_update(
                doc! { "_id": student_id },
                Self::apply_submission_pipeline(score),
            )
            .with_options(
                FindOneAndUpdateOptions::builder()
                    .upsert(true)
                    .return_document(ReturnDocument::After)
                    .build(),
            )
            .await?
            .ok_or_else(|| {
                EngineError::Persistence(anyhow::anyhow!(
                    "stats upsert returned no document for student {}",
                    student_id
                ))
            })?;

        let stats_doc = updated.get_document("stats").cloned().unwrap_or_default();

        Ok(StudentStats {
            quizzes_taken: Self::read_counter(&stats_doc, "quizzesTaken"),
            total_score: Self::read_counter(&stats_doc, "totalScore"),
            average_score: Self::read_average(&stats_doc),
            topics_completed: Self::read_counter(&stats_doc, "topicsCompleted") as u32,
        })
    }

    async fn write_snapshot(
        &self,
        student_id: &str,
        stats: &StudentStats,
    ) -> Result<(), EngineError> {
        self.collection()
            .update_one(
                doc! { "_id": student_id },
                doc! { "$set": {
                    "stats.quizzesTaken": stats.quizzes_taken as i64,
                    "stats.totalScore": stats.total_score as i64,
                    "stats.averageScore": i64::from(stats.average_score),
                    "stats.topicsCompleted": i64::from(stats.topics_completed),
                } },
            )
            .with_options(mongodb::options::UpdateOptions::builder().upsert(true).build())
            .await?;
        Ok(())
    }

    async fn touch_last_active(&self, student_id: &str) -> Result<(), EngineError> {
        self.collection()
            .update_one(
                doc! { "_id": student_id },
                doc! { "$set": { "lastActive": now_bson() } },
            )
            .await?;
        Ok(())
    }
}
