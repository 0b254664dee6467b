//! In-memory collaborators for exercising the engine without MongoDB,
//! Redis or the generator upstream.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use quizbank_api::error::EngineError;
use quizbank_api::models::stats::{AttemptFilter, StudentStats};
use quizbank_api::models::submission::Submission;
use quizbank_api::models::{Question, Stream};
use quizbank_api::services::generator::{GeneratedQuestion, QuestionGenerator};
use quizbank_api::stores::{
    QuestionFilter, QuestionStore, ResponseCache, StudentStatsStore, SubmissionStore,
};

pub fn question(id: &str, class: u8, stream: Stream, subject: &str, topic: &str) -> Question {
    question_with_answer(id, class, stream, subject, topic, 0)
}

pub fn question_with_answer(
    id: &str,
    class: u8,
    stream: Stream,
    subject: &str,
    topic: &str,
    correct_answer_index: u8,
) -> Question {
    Question {
        id: id.to_string(),
        class,
        stream,
        subject: subject.to_string(),
        topic: topic.to_string(),
        question_text: format!("Question {}", id),
        options: vec![
            "alpha".to_string(),
            "beta".to_string(),
            "gamma".to_string(),
            "delta".to_string(),
        ],
        correct_answer_index,
        created_at: Utc::now(),
    }
}

#[derive(Default)]
pub struct MemoryQuestionStore {
    pub questions: Mutex<Vec<Question>>,
}

impl MemoryQuestionStore {
    pub fn seeded(questions: Vec<Question>) -> Self {
        Self {
            questions: Mutex::new(questions),
        }
    }

    pub fn replace_answer(&self, id: &str, correct_answer_index: u8) {
        let mut questions = self.questions.lock().unwrap();
        if let Some(q) = questions.iter_mut().find(|q| q.id == id) {
            q.correct_answer_index = correct_answer_index;
        }
    }

    pub fn remove(&self, id: &str) {
        self.questions.lock().unwrap().retain(|q| q.id != id);
    }

    pub fn len(&self) -> usize {
        self.questions.lock().unwrap().len()
    }
}

#[async_trait]
impl QuestionStore for MemoryQuestionStore {
    async fn find(&self, filter: &QuestionFilter) -> Result<Vec<Question>, EngineError> {
        Ok(self
            .questions
            .lock()
            .unwrap()
            .iter()
            .filter(|q| filter.matches(q))
            .cloned()
            .collect())
    }

    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Question>, EngineError> {
        Ok(self
            .questions
            .lock()
            .unwrap()
            .iter()
            .filter(|q| ids.contains(&q.id))
            .cloned()
            .collect())
    }

    async fn insert_many(&self, questions: &[Question]) -> Result<(), EngineError> {
        self.questions
            .lock()
            .unwrap()
            .extend(questions.iter().cloned());
        Ok(())
    }

    async fn subject_topics(
        &self,
        class: u8,
        stream: Option<Stream>,
    ) -> Result<Vec<(String, String)>, EngineError> {
        let pairs: std::collections::BTreeSet<(String, String)> = self
            .questions
            .lock()
            .unwrap()
            .iter()
            .filter(|q| q.class == class && stream.is_none_or(|s| q.stream == s))
            .map(|q| (q.subject.clone(), q.topic.clone()))
            .collect();
        Ok(pairs.into_iter().collect())
    }
}

#[derive(Default)]
pub struct MemorySubmissionStore {
    pub submissions: Mutex<Vec<Submission>>,
}

#[async_trait]
impl SubmissionStore for MemorySubmissionStore {
    async fn insert(&self, submission: &Submission) -> Result<(), EngineError> {
        self.submissions.lock().unwrap().push(submission.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Submission>, EngineError> {
        Ok(self
            .submissions
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == id)
            .cloned())
    }

    async fn find_by_student(
        &self,
        student_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Submission>, EngineError> {
        let mut matched: Vec<Submission> = self
            .submissions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.student_id == student_id)
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn find_filtered(
        &self,
        filter: &AttemptFilter,
        skip: u64,
        limit: Option<usize>,
    ) -> Result<(Vec<Submission>, u64), EngineError> {
        let mut matched: Vec<Submission> = self
            .submissions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| {
                filter.class.is_none_or(|c| s.class == c)
                    && filter.subject.as_ref().is_none_or(|subj| &s.subject == subj)
                    && filter.topic.as_ref().is_none_or(|t| s.topic.as_ref() == Some(t))
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matched.len() as u64;
        let mut page: Vec<Submission> = matched.into_iter().skip(skip as usize).collect();
        if let Some(limit) = limit {
            page.truncate(limit);
        }
        Ok((page, total))
    }
}

#[derive(Default)]
pub struct MemoryStatsStore {
    pub stats: Mutex<HashMap<String, StudentStats>>,
    pub last_active: Mutex<HashMap<String, chrono::DateTime<Utc>>>,
}

#[async_trait]
impl StudentStatsStore for MemoryStatsStore {
    async fn apply_submission(
        &self,
        student_id: &str,
        score: u8,
    ) -> Result<StudentStats, EngineError> {
        // Single lock held for the whole read-increment-write, matching the
        // atomicity of the production $inc update.
        let mut stats = self.stats.lock().unwrap();
        let entry = stats.entry(student_id.to_string()).or_default();
        entry.quizzes_taken += 1;
        entry.total_score += u64::from(score);
        entry.average_score =
            (entry.total_score as f64 / entry.quizzes_taken as f64).round() as u32;
        Ok(entry.clone())
    }

    async fn write_snapshot(
        &self,
        student_id: &str,
        stats: &StudentStats,
    ) -> Result<(), EngineError> {
        self.stats
            .lock()
            .unwrap()
            .insert(student_id.to_string(), stats.clone());
        Ok(())
    }

    async fn touch_last_active(&self, student_id: &str) -> Result<(), EngineError> {
        self.last_active
            .lock()
            .unwrap()
            .insert(student_id.to_string(), Utc::now());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryResponseCache {
    pub entries: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl ResponseCache for MemoryResponseCache {
    async fn get(&self, key: &str) -> Result<Option<String>, EngineError> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn set_ex(&self, key: &str, value: &str, _ttl_seconds: u64) -> Result<(), EngineError> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Scripted generator double. Counts calls so tests can assert the fast
/// path never touches it.
pub struct StubGenerator {
    batch: Vec<GeneratedQuestion>,
    fail: bool,
    pub calls: AtomicUsize,
}

impl StubGenerator {
    pub fn returning(batch: Vec<GeneratedQuestion>) -> Self {
        Self {
            batch,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            batch: Vec::new(),
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuestionGenerator for StubGenerator {
    async fn generate(
        &self,
        _class: u8,
        _stream: Stream,
        _subject: &str,
        _topic: &str,
    ) -> Result<Vec<GeneratedQuestion>, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(EngineError::Generation(
                "generator upstream unreachable".to_string(),
            ));
        }
        Ok(self.batch.clone())
    }
}

pub fn generated_batch(count: usize) -> Vec<GeneratedQuestion> {
    (0..count)
        .map(|i| GeneratedQuestion {
            question: format!("Generated question {}", i),
            options: vec![
                "one".to_string(),
                "two".to_string(),
                "three".to_string(),
                "four".to_string(),
            ],
            correct_answer_index: (i % 4) as i64,
        })
        .collect()
}
