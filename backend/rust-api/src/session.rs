//! Consumer-side quiz session state machine.
//!
//! Runs in the client consuming a [`QuizSet`]; the server only ever sees the
//! final answer payload. Time is injected through [`Clock`] so deadline
//! behavior is testable without wall-clock waiting.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::models::submission::{SubmittedAnswer, UNANSWERED};
use crate::models::QuizSet;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    InProgress,
    Paused,
    Submitted,
    Expired,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("quiz already started")]
    AlreadyStarted,
    #[error("session is not in progress")]
    NotInProgress,
    #[error("unknown question: {0}")]
    UnknownQuestion(String),
}

/// Client-local answer state for one question.
#[derive(Debug, Clone, Default)]
pub struct SessionAnswer {
    pub selected_label: Option<char>,
    pub marked_for_review: bool,
}

/// Final payload handed to the grading endpoint on (implicit or explicit)
/// submit. Unanswered questions encode `selected_index = -1`.
#[derive(Debug, Clone)]
pub struct SessionSubmission {
    pub answers: Vec<SubmittedAnswer>,
    pub time_taken_seconds: u32,
}

pub struct QuizSession<C: Clock = SystemClock> {
    clock: C,
    state: SessionState,
    quiz: Option<QuizSet>,
    answers: BTreeMap<String, SessionAnswer>,
    started_at: Option<DateTime<Utc>>,
    deadline: Option<DateTime<Utc>>,
    /// Instant the countdown display froze at, while paused.
    paused_at: Option<DateTime<Utc>>,
}

impl QuizSession<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for QuizSession<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> QuizSession<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            state: SessionState::NotStarted,
            quiz: None,
            answers: BTreeMap::new(),
            started_at: None,
            deadline: None,
            paused_at: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn answer_for(&self, question_id: &str) -> Option<&SessionAnswer> {
        self.answers.get(question_id)
    }

    pub fn start(&mut self, quiz: QuizSet) -> Result<(), SessionError> {
        if self.state != SessionState::NotStarted {
            return Err(SessionError::AlreadyStarted);
        }
        let now = self.clock.now();
        self.deadline = Some(now + Duration::milliseconds(quiz.duration_ms as i64));
        self.started_at = Some(now);
        self.quiz = Some(quiz);
        self.state = SessionState::InProgress;
        Ok(())
    }

    /// Countdown remaining. Frozen while paused; the wall-clock deadline
    /// itself never moves.
    pub fn remaining(&self) -> Duration {
        let deadline = match self.deadline {
            Some(deadline) => deadline,
            None => return Duration::zero(),
        };
        let reference = match (self.state, self.paused_at) {
            (SessionState::Paused, Some(paused_at)) => paused_at,
            _ => self.clock.now(),
        };
        (deadline - reference).max(Duration::zero())
    }

    /// Idempotent upsert of the selected option label.
    pub fn answer(&mut self, question_id: &str, label: char) -> Result<(), SessionError> {
        self.ensure_in_progress()?;
        self.ensure_known(question_id)?;
        self.answers
            .entry(question_id.to_string())
            .or_default()
            .selected_label = Some(label);
        Ok(())
    }

    /// Toggles the review flag; an unanswered question can still be flagged.
    pub fn mark_for_review(&mut self, question_id: &str) -> Result<bool, SessionError> {
        self.ensure_in_progress()?;
        self.ensure_known(question_id)?;
        let entry = self.answers.entry(question_id.to_string()).or_default();
        entry.marked_for_review = !entry.marked_for_review;
        Ok(entry.marked_for_review)
    }

    pub fn pause(&mut self) -> Result<(), SessionError> {
        self.ensure_in_progress()?;
        self.paused_at = Some(self.clock.now());
        self.state = SessionState::Paused;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Paused {
            return Err(SessionError::NotInProgress);
        }
        self.paused_at = None;
        self.state = SessionState::InProgress;
        Ok(())
    }

    /// Deadline check. Past the deadline an in-progress session flips to
    /// `Expired` and the answer payload comes back as an implicit submit.
    pub fn poll_expiry(&mut self) -> Option<SessionSubmission> {
        if self.state != SessionState::InProgress {
            return None;
        }
        let deadline = self.deadline?;
        if self.clock.now() < deadline {
            return None;
        }
        self.state = SessionState::Expired;
        Some(self.package())
    }

    /// Explicit submit. Legal exactly once from InProgress/Paused;
    /// everything else is a no-op.
    pub fn submit(&mut self) -> Option<SessionSubmission> {
        match self.state {
            SessionState::InProgress | SessionState::Paused => {
                self.state = SessionState::Submitted;
                Some(self.package())
            }
            _ => None,
        }
    }

    /// Abandoning before submit discards all local answer state; nothing
    /// partial is ever handed to the server.
    pub fn abandon(mut self) {
        self.answers.clear();
        self.quiz = None;
    }

    fn package(&self) -> SessionSubmission {
        let quiz = self.quiz.as_ref().expect("session started");
        let answers = quiz
            .questions
            .iter()
            .map(|q| SubmittedAnswer {
                question_id: q.id.clone(),
                selected_index: self
                    .answers
                    .get(&q.id)
                    .and_then(|a| a.selected_label)
                    .map(label_to_index)
                    .unwrap_or(UNANSWERED),
            })
            .collect();

        let elapsed = quiz.duration_ms as i64 - self.remaining().num_milliseconds();
        SessionSubmission {
            answers,
            time_taken_seconds: (elapsed.max(0) / 1000) as u32,
        }
    }

    fn ensure_in_progress(&mut self) -> Result<(), SessionError> {
        // An expired deadline takes precedence over the requested action.
        self.poll_expiry();
        if self.state != SessionState::InProgress {
            return Err(SessionError::NotInProgress);
        }
        Ok(())
    }

    fn ensure_known(&self, question_id: &str) -> Result<(), SessionError> {
        let known = self
            .quiz
            .as_ref()
            .map(|quiz| quiz.questions.iter().any(|q| q.id == question_id))
            .unwrap_or(false);
        if known {
            Ok(())
        } else {
            Err(SessionError::UnknownQuestion(question_id.to_string()))
        }
    }
}

fn label_to_index(label: char) -> i32 {
    let upper = label.to_ascii_uppercase();
    if ('A'..='D').contains(&upper) {
        i32::from(upper as u8 - b'A')
    } else {
        UNANSWERED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OptionView, QuestionProjection, QuizConfiguration};
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    struct ManualClock(Arc<Mutex<DateTime<Utc>>>);

    impl ManualClock {
        fn at_epoch() -> Self {
            Self(Arc::new(Mutex::new(
                DateTime::parse_from_rfc3339("2024-01-01T10:00:00Z")
                    .unwrap()
                    .with_timezone(&Utc),
            )))
        }

        fn advance(&self, duration: Duration) {
            let mut now = self.0.lock().unwrap();
            *now += duration;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    fn quiz(question_ids: &[&str], duration_minutes: u32) -> QuizSet {
        QuizSet {
            config: QuizConfiguration {
                class: 9,
                stream: None,
                subject: "Maths".to_string(),
                topic: String::new(),
                question_count: question_ids.len(),
                duration_minutes,
            },
            questions: question_ids
                .iter()
                .map(|id| QuestionProjection {
                    id: id.to_string(),
                    question_text: "?".to_string(),
                    options: vec![
                        OptionView {
                            label: "A".to_string(),
                            text: "a".to_string(),
                        },
                        OptionView {
                            label: "B".to_string(),
                            text: "b".to_string(),
                        },
                    ],
                })
                .collect(),
            start_time: Utc::now(),
            duration_ms: u64::from(duration_minutes) * 60 * 1000,
        }
    }

    fn started(clock: &ManualClock) -> QuizSession<ManualClock> {
        let mut session = QuizSession::with_clock(clock.clone());
        session.start(quiz(&["q1", "q2", "q3"], 10)).unwrap();
        session
    }

    #[test]
    fn cannot_start_twice() {
        let clock = ManualClock::at_epoch();
        let mut session = started(&clock);
        assert_eq!(
            session.start(quiz(&["q9"], 5)),
            Err(SessionError::AlreadyStarted)
        );
    }

    #[test]
    fn answer_is_an_idempotent_upsert() {
        let clock = ManualClock::at_epoch();
        let mut session = started(&clock);
        session.answer("q1", 'A').unwrap();
        session.answer("q1", 'B').unwrap();
        assert_eq!(session.answer_for("q1").unwrap().selected_label, Some('B'));
    }

    #[test]
    fn answer_requires_in_progress() {
        let clock = ManualClock::at_epoch();
        let mut session = QuizSession::with_clock(clock.clone());
        assert_eq!(session.answer("q1", 'A'), Err(SessionError::NotInProgress));

        let mut session = started(&clock);
        session.pause().unwrap();
        assert_eq!(session.answer("q1", 'A'), Err(SessionError::NotInProgress));
    }

    #[test]
    fn review_flag_toggles_without_answer() {
        let clock = ManualClock::at_epoch();
        let mut session = started(&clock);
        assert!(session.mark_for_review("q2").unwrap());
        assert!(!session.mark_for_review("q2").unwrap());
        assert_eq!(session.answer_for("q2").unwrap().selected_label, None);
    }

    #[test]
    fn pause_freezes_countdown_but_not_deadline() {
        let clock = ManualClock::at_epoch();
        let mut session = started(&clock);

        clock.advance(Duration::minutes(2));
        session.pause().unwrap();
        let frozen = session.remaining();

        clock.advance(Duration::minutes(3));
        assert_eq!(session.remaining(), frozen);

        // Deadline is wall-clock: resuming past it expires on the next poll.
        session.resume().unwrap();
        clock.advance(Duration::minutes(6));
        assert!(session.poll_expiry().is_some());
        assert_eq!(session.state(), SessionState::Expired);
    }

    #[test]
    fn expiry_packages_an_implicit_submit() {
        let clock = ManualClock::at_epoch();
        let mut session = started(&clock);
        session.answer("q1", 'B').unwrap();

        clock.advance(Duration::minutes(10));
        let payload = session.poll_expiry().unwrap();

        assert_eq!(session.state(), SessionState::Expired);
        assert_eq!(payload.answers.len(), 3);
        assert_eq!(payload.answers[0].selected_index, 1);
        assert_eq!(payload.answers[1].selected_index, UNANSWERED);
        // Full duration consumed.
        assert_eq!(payload.time_taken_seconds, 600);
    }

    #[test]
    fn submit_is_legal_exactly_once() {
        let clock = ManualClock::at_epoch();
        let mut session = started(&clock);
        session.answer("q3", 'A').unwrap();
        clock.advance(Duration::minutes(4));

        let payload = session.submit().unwrap();
        assert_eq!(session.state(), SessionState::Submitted);
        assert_eq!(payload.time_taken_seconds, 240);
        assert_eq!(payload.answers[2].selected_index, 0);

        assert!(session.submit().is_none());
        assert_eq!(session.state(), SessionState::Submitted);
    }

    #[test]
    fn submit_from_paused_is_legal() {
        let clock = ManualClock::at_epoch();
        let mut session = started(&clock);
        session.pause().unwrap();
        assert!(session.submit().is_some());
    }

    #[test]
    fn no_expiry_before_deadline() {
        let clock = ManualClock::at_epoch();
        let mut session = started(&clock);
        clock.advance(Duration::minutes(9));
        assert!(session.poll_expiry().is_none());
        assert_eq!(session.state(), SessionState::InProgress);
    }

    #[test]
    fn unknown_question_is_rejected() {
        let clock = ManualClock::at_epoch();
        let mut session = started(&clock);
        assert_eq!(
            session.answer("nope", 'A'),
            Err(SessionError::UnknownQuestion("nope".to_string()))
        );
    }
}
