use std::sync::Arc;

use crate::error::EngineError;
use crate::models::{QuizConfiguration, Stream};
use crate::stores::{QuestionFilter, QuestionStore};

/// Filters the question bank for one quiz configuration. Read-only.
pub struct QuestionPoolSelector {
    questions: Arc<dyn QuestionStore>,
}

impl QuestionPoolSelector {
    pub fn new(questions: Arc<dyn QuestionStore>) -> Self {
        Self { questions }
    }

    pub async fn select(
        &self,
        config: &QuizConfiguration,
    ) -> Result<Vec<crate::models::Question>, EngineError> {
        let filter = Self::build_filter(config)?;
        let pool = self.questions.find(&filter).await?;
        tracing::debug!(
            "Selected {} bank questions for class={} subject={}",
            pool.len(),
            config.class,
            config.subject
        );
        Ok(pool)
    }

    /// Class matches exactly; the stream filter only participates for
    /// classes 11-12 with a real stream; topic only when non-empty.
    pub fn build_filter(config: &QuizConfiguration) -> Result<QuestionFilter, EngineError> {
        config.ensure_valid()?;

        let stream = match config.effective_stream() {
            Stream::None => None,
            stream => Some(stream),
        };

        let topic = if config.topic.trim().is_empty() {
            None
        } else {
            Some(config.topic.clone())
        };

        Ok(QuestionFilter {
            class: config.class,
            stream,
            subject: config.subject.clone(),
            topic,
        })
    }
}
