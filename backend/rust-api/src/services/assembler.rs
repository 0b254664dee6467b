use std::sync::Arc;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

use crate::error::EngineError;
use crate::metrics::QUIZZES_ASSEMBLED_TOTAL;
use crate::models::{Question, QuestionProjection, QuizConfiguration, QuizSet};
use crate::stores::QuestionStore;

use super::generator::QuestionGenerator;
use super::pool_selector::QuestionPoolSelector;

/// Orchestrates pool selection and, on shortfall, supplementation from the
/// external generator. Newly generated questions are persisted so future
/// requests reuse them instead of calling the generator again.
pub struct QuizAssembler {
    selector: QuestionPoolSelector,
    questions: Arc<dyn QuestionStore>,
    generator: Arc<dyn QuestionGenerator>,
}

impl QuizAssembler {
    pub fn new(questions: Arc<dyn QuestionStore>, generator: Arc<dyn QuestionGenerator>) -> Self {
        Self {
            selector: QuestionPoolSelector::new(questions.clone()),
            questions,
            generator,
        }
    }

    pub async fn assemble(&self, config: &QuizConfiguration) -> Result<QuizSet, EngineError> {
        let mut rng = StdRng::from_os_rng();
        self.assemble_with_rng(config, &mut rng).await
    }

    /// Assembly with an injected RNG so the shuffle is reproducible in tests.
    pub async fn assemble_with_rng<R: Rng + Send>(
        &self,
        config: &QuizConfiguration,
        rng: &mut R,
    ) -> Result<QuizSet, EngineError> {
        let mut pool = self.selector.select(config).await?;
        let requested = config.question_count;

        // Fast path: the bank already covers the request. No generator call,
        // no writes.
        if pool.len() >= requested {
            pool.shuffle(rng);
            pool.truncate(requested);
            QUIZZES_ASSEMBLED_TOTAL.with_label_values(&["pool"]).inc();
            return Ok(Self::package(config, &pool));
        }

        let remaining = requested - pool.len();
        tracing::info!(
            "Question pool short by {} for class={} subject={}, supplementing",
            remaining,
            config.class,
            config.subject
        );

        let generated = match self
            .generator
            .generate(
                config.class,
                config.effective_stream(),
                &config.subject,
                &config.topic,
            )
            .await
        {
            Ok(items) => items,
            // A partial pool is still a deliverable quiz; only a generator
            // failure with nothing to fall back on is fatal.
            Err(e) if !pool.is_empty() => {
                tracing::warn!(
                    "Generator failed ({}), serving partial pool of {}",
                    e,
                    pool.len()
                );
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        let mut fresh: Vec<Question> = generated
            .into_iter()
            .take(remaining)
            .map(|candidate| Question {
                id: Uuid::new_v4().to_string(),
                class: config.class,
                stream: config.effective_stream(),
                subject: config.subject.clone(),
                topic: config.topic_or_general(),
                question_text: candidate.question,
                options: candidate.options,
                correct_answer_index: candidate.correct_answer_index as u8,
                created_at: Utc::now(),
            })
            .collect();
        fresh.retain(|q| q.validate_shape().is_ok());

        // The bank grows permanently from generated content.
        self.questions.insert_many(&fresh).await?;

        pool.extend(fresh);
        pool.shuffle(rng);
        pool.truncate(requested);
        QUIZZES_ASSEMBLED_TOTAL
            .with_label_values(&["supplemented"])
            .inc();

        // Fewer than requested is a valid degraded quiz, not an error.
        Ok(Self::package(config, &pool))
    }

    fn package(config: &QuizConfiguration, questions: &[Question]) -> QuizSet {
        let mut echoed = config.clone();
        echoed.stream = Some(config.effective_stream());

        QuizSet {
            config: echoed,
            questions: questions.iter().map(QuestionProjection::from_question).collect(),
            start_time: Utc::now(),
            duration_ms: config.duration_ms(),
        }
    }
}
