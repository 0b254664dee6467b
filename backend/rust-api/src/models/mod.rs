use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::EngineError;

pub mod stats;
pub mod submission;

pub const MIN_CLASS: u8 = 5;
pub const MAX_CLASS: u8 = 12;
/// Stream choices only exist for senior classes.
pub const STREAM_CLASS_THRESHOLD: u8 = 11;
pub const OPTION_COUNT: usize = 4;

/// Academic stream for classes 11-12. Junior classes always carry `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stream {
    #[serde(rename = "PCM")]
    Pcm,
    #[serde(rename = "PCB")]
    Pcb,
    None,
}

impl Default for Stream {
    fn default() -> Self {
        Stream::None
    }
}

impl Stream {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stream::Pcm => "PCM",
            Stream::Pcb => "PCB",
            Stream::None => "None",
        }
    }
}

impl std::fmt::Display for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bank question. Immutable once referenced by a submission: submissions
/// snapshot the correct index at grading time, so later edits never rewrite
/// recorded results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    #[serde(rename = "_id")]
    pub id: String,
    pub class: u8,
    pub stream: Stream,
    pub subject: String,
    pub topic: String,
    pub question_text: String,
    pub options: Vec<String>,
    pub correct_answer_index: u8,
    pub created_at: DateTime<Utc>,
}

impl Question {
    /// Authoring/import invariants: exactly 4 options, correct index in
    /// range, no stream below class 11.
    pub fn validate_shape(&self) -> Result<(), EngineError> {
        if !(MIN_CLASS..=MAX_CLASS).contains(&self.class) {
            return Err(EngineError::Validation(format!(
                "class must be between {} and {}",
                MIN_CLASS, MAX_CLASS
            )));
        }
        if self.options.len() != OPTION_COUNT {
            return Err(EngineError::Validation(
                "question must have exactly 4 options".to_string(),
            ));
        }
        if usize::from(self.correct_answer_index) >= OPTION_COUNT {
            return Err(EngineError::Validation(
                "correct answer index must be between 0 and 3".to_string(),
            ));
        }
        if self.class < STREAM_CLASS_THRESHOLD && self.stream != Stream::None {
            return Err(EngineError::Validation(
                "stream must be None for classes below 11".to_string(),
            ));
        }
        Ok(())
    }
}

/// One quiz request: the (class, stream, subject, topic, count, duration)
/// tuple. Ephemeral, never persisted on its own.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct QuizConfiguration {
    #[validate(range(min = 5, max = 12, message = "class must be between 5 and 12"))]
    pub class: u8,
    #[serde(default)]
    pub stream: Option<Stream>,
    #[validate(length(min = 1, message = "subject is required"))]
    pub subject: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default = "default_question_count", alias = "count")]
    #[validate(range(min = 1, max = 50, message = "count must be between 1 and 50"))]
    pub question_count: usize,
    #[serde(default = "default_duration_minutes", alias = "duration")]
    #[validate(range(min = 1, max = 180, message = "duration must be between 1 and 180 minutes"))]
    pub duration_minutes: u32,
}

fn default_question_count() -> usize {
    10
}

fn default_duration_minutes() -> u32 {
    15
}

impl QuizConfiguration {
    pub fn ensure_valid(&self) -> Result<(), EngineError> {
        self.validate()
            .map_err(|e| EngineError::Configuration(flatten_validation_errors(&e)))
    }

    /// The stream that actually applies to this request: junior classes and
    /// explicit `None` both collapse to `Stream::None`, which makes the
    /// stream filter inert below class 11.
    pub fn effective_stream(&self) -> Stream {
        match self.stream {
            Some(stream) if self.class >= STREAM_CLASS_THRESHOLD => stream,
            _ => Stream::None,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        u64::from(self.duration_minutes) * 60 * 1000
    }

    /// Topic with the persistence default applied.
    pub fn topic_or_general(&self) -> String {
        if self.topic.trim().is_empty() {
            "General".to_string()
        } else {
            self.topic.clone()
        }
    }
}

fn flatten_validation_errors(errors: &validator::ValidationErrors) -> String {
    let mut parts: Vec<String> = Vec::new();
    for (field, field_errors) in errors.field_errors() {
        for err in field_errors.iter() {
            match &err.message {
                Some(msg) => parts.push(msg.to_string()),
                None => parts.push(format!("invalid value for {}", field)),
            }
        }
    }
    parts.sort();
    parts.join("; ")
}

/// Labelled option as exposed to quiz takers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionView {
    pub label: String,
    pub text: String,
}

/// Outbound projection of a question: the correct answer index is withheld,
/// it stays server-side for grading.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionProjection {
    pub id: String,
    pub question_text: String,
    pub options: Vec<OptionView>,
}

impl QuestionProjection {
    pub fn from_question(question: &Question) -> Self {
        Self {
            id: question.id.clone(),
            question_text: question.question_text.clone(),
            options: question
                .options
                .iter()
                .enumerate()
                .map(|(idx, text)| OptionView {
                    label: option_label(idx).to_string(),
                    text: text.clone(),
                })
                .collect(),
        }
    }
}

/// Option index 0..=3 to display label A..=D.
pub fn option_label(index: usize) -> char {
    (b'A' + index as u8) as char
}

/// Ready-to-run quiz envelope handed to the session. Discarded after submit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSet {
    pub config: QuizConfiguration,
    pub questions: Vec<QuestionProjection>,
    pub start_time: DateTime<Utc>,
    // Milliseconds on the wire, under the legacy "duration" key.
    #[serde(rename = "duration")]
    pub duration_ms: u64,
}

impl QuizSet {
    pub fn is_short(&self) -> bool {
        self.questions.len() < self.config.question_count
    }
}
