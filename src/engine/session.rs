use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::engine::answer_store::AnswerStore;
use crate::engine::clock::{ClockState, ClockTick, SessionClock};
use crate::engine::navigation::{Navigator, Overview, QuestionStatus};
use crate::engine::review_flags::ReviewFlags;
use crate::error::{Error, Result};
use crate::models::answer::AnswerValue;
use crate::models::question::Question;
use crate::models::test::TestDefinition;
use crate::models::test_attempt::{AttemptRecord, SessionSnapshot, SessionStatus, SubmitTrigger};

/// Outcome of a submit call. `first` is false when the attempt had already
/// been submitted and the stored record is returned unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub record: AttemptRecord,
    pub first: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Running(u32),
    Expired(Submission),
    Inactive,
}

/// State of one attempt: answers, flags, position, clock and the submission
/// record. All mutation goes through here so the submitted freeze holds.
#[derive(Debug)]
pub struct TestSession {
    attempt_id: Uuid,
    user_id: Uuid,
    test: Arc<TestDefinition>,
    status: SessionStatus,
    clock: SessionClock,
    answers: AnswerStore,
    flags: ReviewFlags,
    nav: Navigator,
    record: Option<AttemptRecord>,
}

impl TestSession {
    /// Creates the session and starts its clock. Called only once the
    /// student has confirmed the start of the test.
    pub fn start(
        attempt_id: Uuid,
        user_id: Uuid,
        test: Arc<TestDefinition>,
        duration_seconds: u32,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let mut session = Self::idle(attempt_id, user_id, test, duration_seconds)?;
        session.clock.start(now);
        Ok(session)
    }

    /// Rebuilds a session from an autosaved draft and resumes its clock.
    pub fn restore(test: Arc<TestDefinition>, snapshot: SessionSnapshot) -> Result<Self> {
        if snapshot.test_id != test.id {
            return Err(Error::BadRequest(format!(
                "draft for attempt {} belongs to another test",
                snapshot.attempt_id
            )));
        }
        let mut session = Self::idle(
            snapshot.attempt_id,
            snapshot.user_id,
            test,
            snapshot.duration_seconds,
        )?;

        // Drop draft entries that no longer fit the bank instead of refusing to resume.
        let answers = snapshot
            .answers
            .into_iter()
            .filter(|(id, value)| {
                session
                    .test
                    .question(id)
                    .is_some_and(|q| q.check_answer(value).is_ok())
            })
            .collect();
        let flags = snapshot
            .flags
            .into_iter()
            .filter(|id| session.test.question(id).is_some())
            .collect();
        session.answers = AnswerStore::from_map(answers);
        session.flags = ReviewFlags::from_set(flags);
        let last = session.nav.question_count() - 1;
        session.nav.go_to(snapshot.current_index.min(last))?;
        session
            .clock
            .restore(snapshot.started_at, snapshot.remaining_seconds);
        Ok(session)
    }

    /// Read-only session for an attempt that was already submitted and
    /// recorded. Every mutator refuses with `SessionClosed`.
    pub fn from_record(test: Arc<TestDefinition>, record: AttemptRecord) -> Result<Self> {
        if record.test_id != test.id {
            return Err(Error::BadRequest(format!(
                "attempt {} belongs to another test",
                record.attempt_id
            )));
        }
        let duration = test.duration_seconds().max(record.time_taken_seconds);
        let mut session = Self::idle(record.attempt_id, record.user_id, test, duration)?;
        session.answers = AnswerStore::from_map(record.answers.clone());
        session
            .clock
            .restore(record.started_at, duration - record.time_taken_seconds);
        session.clock.stop();
        session.status = SessionStatus::Submitted;
        session.record = Some(record);
        Ok(session)
    }

    fn idle(
        attempt_id: Uuid,
        user_id: Uuid,
        test: Arc<TestDefinition>,
        duration_seconds: u32,
    ) -> Result<Self> {
        test.validate()?;
        if duration_seconds == 0 {
            return Err(Error::InvalidTest("session duration must be positive".into()));
        }
        let nav = Navigator::new(&test);
        Ok(Self {
            attempt_id,
            user_id,
            test,
            status: SessionStatus::InProgress,
            clock: SessionClock::new(duration_seconds),
            answers: AnswerStore::default(),
            flags: ReviewFlags::default(),
            nav,
            record: None,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        match self.status {
            SessionStatus::InProgress => Ok(()),
            SessionStatus::Submitted => Err(Error::SessionClosed),
        }
    }

    fn question(&self, question_id: &str) -> Result<&Question> {
        self.test
            .question(question_id)
            .ok_or_else(|| Error::UnknownQuestion(question_id.to_string()))
    }

    pub fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn test(&self) -> &Arc<TestDefinition> {
        &self.test
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_submitted(&self) -> bool {
        self.status == SessionStatus::Submitted
    }

    pub fn clock_state(&self) -> ClockState {
        self.clock.state()
    }

    /// True for a restored draft whose time ran out while nobody was watching.
    pub fn is_expired_unsubmitted(&self) -> bool {
        self.clock.state() == ClockState::Expired && !self.is_submitted()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.clock.started_at()
    }

    pub fn duration_seconds(&self) -> u32 {
        self.clock.duration_seconds()
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.clock.remaining_seconds()
    }

    pub fn record(&self) -> Option<&AttemptRecord> {
        self.record.as_ref()
    }

    pub fn set_answer(&mut self, question_id: &str, value: AnswerValue) -> Result<()> {
        self.ensure_open()?;
        self.question(question_id)?.check_answer(&value)?;
        self.answers.set(question_id, value);
        Ok(())
    }

    pub fn get_answer(&self, question_id: &str) -> Result<Option<&AnswerValue>> {
        self.question(question_id)?;
        Ok(self.answers.get(question_id))
    }

    pub fn clear_answer(&mut self, question_id: &str) -> Result<()> {
        self.ensure_open()?;
        self.question(question_id)?;
        self.answers.clear(question_id);
        Ok(())
    }

    pub fn toggle_flag(&mut self, question_id: &str) -> Result<bool> {
        self.ensure_open()?;
        self.question(question_id)?;
        Ok(self.flags.toggle(question_id))
    }

    pub fn is_flagged(&self, question_id: &str) -> bool {
        self.flags.is_flagged(question_id)
    }

    pub fn current_index(&self) -> usize {
        self.nav.current()
    }

    pub fn current_section(&self) -> usize {
        self.nav.current_section()
    }

    pub fn section_count(&self) -> usize {
        self.nav.section_count()
    }

    pub fn current_question(&self) -> &Question {
        &self.test.questions[self.nav.current()]
    }

    pub fn question_count(&self) -> usize {
        self.nav.question_count()
    }

    pub fn go_to(&mut self, index: usize) -> Result<usize> {
        self.ensure_open()?;
        self.nav.go_to(index)
    }

    pub fn next(&mut self) -> Result<usize> {
        self.ensure_open()?;
        Ok(self.nav.next())
    }

    pub fn previous(&mut self) -> Result<usize> {
        self.ensure_open()?;
        Ok(self.nav.previous())
    }

    pub fn go_to_section(&mut self, section: usize) -> Result<usize> {
        self.ensure_open()?;
        self.nav.go_to_section(section)
    }

    pub fn status_of(&self, index: usize) -> Result<QuestionStatus> {
        let question = self
            .test
            .questions
            .get(index)
            .ok_or(Error::IndexOutOfRange {
                index,
                len: self.nav.question_count(),
            })?;
        Ok(QuestionStatus {
            answered: self.answers.has_content(&question.id),
            flagged: self.flags.is_flagged(&question.id),
        })
    }

    pub fn statuses(&self) -> Vec<QuestionStatus> {
        self.test
            .questions
            .iter()
            .map(|q| QuestionStatus {
                answered: self.answers.has_content(&q.id),
                flagged: self.flags.is_flagged(&q.id),
            })
            .collect()
    }

    pub fn overview(&self) -> Overview {
        self.statuses()
            .into_iter()
            .fold(Overview::default(), |mut acc, status| {
                if status.answered {
                    acc.answered += 1;
                } else {
                    acc.unanswered += 1;
                }
                if status.flagged {
                    acc.flagged += 1;
                }
                acc
            })
    }

    /// Advances the clock by one second. Expiry submits in the same step so
    /// no input can land between the last second and the freeze.
    pub fn tick(&mut self, now: DateTime<Utc>) -> TickOutcome {
        if self.is_submitted() {
            return TickOutcome::Inactive;
        }
        match self.clock.tick() {
            ClockTick::Running(remaining) => TickOutcome::Running(remaining),
            ClockTick::Expired => TickOutcome::Expired(self.submit(SubmitTrigger::Timeout, now)),
            ClockTick::Inactive => TickOutcome::Inactive,
        }
    }

    pub fn submit(&mut self, trigger: SubmitTrigger, now: DateTime<Utc>) -> Submission {
        if let Some(record) = &self.record {
            return Submission {
                record: record.clone(),
                first: false,
            };
        }

        self.clock.stop();
        self.status = SessionStatus::Submitted;
        let record = AttemptRecord {
            attempt_id: self.attempt_id,
            test_id: self.test.id,
            user_id: self.user_id,
            started_at: self.clock.started_at().unwrap_or(now),
            submitted_at: now,
            time_taken_seconds: self.clock.elapsed_seconds(),
            trigger,
            answers: self.answers.snapshot(),
        };
        self.record = Some(record.clone());
        Submission {
            record,
            first: true,
        }
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> SessionSnapshot {
        SessionSnapshot {
            attempt_id: self.attempt_id,
            test_id: self.test.id,
            user_id: self.user_id,
            started_at: self.clock.started_at().unwrap_or(now),
            duration_seconds: self.clock.duration_seconds(),
            remaining_seconds: self.clock.remaining_seconds(),
            current_index: self.nav.current(),
            answers: self.answers.snapshot(),
            flags: self.flags.snapshot(),
            saved_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::navigation::DisplayStatus;
    use crate::models::question::{CorrectAnswer, QuestionOption, QuestionType};
    use std::collections::BTreeSet;

    fn options() -> Vec<QuestionOption> {
        ["A", "B", "C", "D"]
            .iter()
            .map(|id| QuestionOption {
                id: (*id).into(),
                text: format!("Option {id}"),
            })
            .collect()
    }

    fn sample_test() -> Arc<TestDefinition> {
        Arc::new(TestDefinition {
            id: Uuid::new_v4(),
            title: "Foundation Mock 1".into(),
            duration_minutes: 1,
            passing_score: 50.0,
            questions: vec![
                Question {
                    id: "q1".into(),
                    question_type: QuestionType::SingleChoice,
                    text: "Which is a liability?".into(),
                    options: options(),
                    marks: 1,
                    correct_answer: CorrectAnswer::Single("B".into()),
                    section: Some("Accounts".into()),
                },
                Question {
                    id: "q2".into(),
                    question_type: QuestionType::MultipleChoice,
                    text: "Pick the current assets".into(),
                    options: options(),
                    marks: 2,
                    correct_answer: CorrectAnswer::Multiple(
                        ["A".to_string(), "C".to_string()].into(),
                    ),
                    section: Some("Accounts".into()),
                },
                Question {
                    id: "q3".into(),
                    question_type: QuestionType::Numeric,
                    text: "Depreciation for year one?".into(),
                    options: vec![],
                    marks: 3,
                    correct_answer: CorrectAnswer::Numeric(1200.0),
                    section: Some("Maths".into()),
                },
            ],
        })
    }

    fn started(duration: u32) -> TestSession {
        TestSession::start(Uuid::new_v4(), Uuid::new_v4(), sample_test(), duration, Utc::now())
            .unwrap()
    }

    #[test]
    fn recorded_attempt_rebuilds_as_a_frozen_session() {
        let mut session = started(60);
        session
            .set_answer("q1", AnswerValue::SingleChoice("B".into()))
            .unwrap();
        for _ in 0..12 {
            session.tick(Utc::now());
        }
        let record = session.submit(SubmitTrigger::Manual, Utc::now()).record;

        let mut frozen = TestSession::from_record(session.test().clone(), record.clone()).unwrap();
        assert_eq!(frozen.status(), SessionStatus::Submitted);
        assert_eq!(frozen.remaining_seconds(), 48);
        assert_eq!(
            frozen.get_answer("q1").unwrap(),
            Some(&AnswerValue::SingleChoice("B".into()))
        );
        assert!(matches!(
            frozen.set_answer("q1", AnswerValue::SingleChoice("A".into())),
            Err(Error::SessionClosed)
        ));
        let again = frozen.submit(SubmitTrigger::Timeout, Utc::now());
        assert!(!again.first);
        assert_eq!(again.record, record);
    }

    #[test]
    fn second_submit_returns_the_first_record() {
        let mut session = started(60);
        session.tick(Utc::now());
        let first = session.submit(SubmitTrigger::Manual, Utc::now());
        let second = session.submit(SubmitTrigger::Timeout, Utc::now());
        assert!(first.first);
        assert!(!second.first);
        assert_eq!(first.record, second.record);
        assert_eq!(second.record.trigger, SubmitTrigger::Manual);
    }

    #[test]
    fn time_taken_is_duration_minus_remaining() {
        let mut session = started(60);
        for _ in 0..15 {
            session.tick(Utc::now());
        }
        let submission = session.submit(SubmitTrigger::Manual, Utc::now());
        assert_eq!(submission.record.time_taken_seconds, 15);
        assert_eq!(session.remaining_seconds(), 45);
    }

    #[test]
    fn mutations_after_submit_are_rejected_without_side_effects() {
        let mut session = started(60);
        session
            .set_answer("q1", AnswerValue::SingleChoice("B".into()))
            .unwrap();
        session.toggle_flag("q2").unwrap();
        session.go_to(1).unwrap();
        session.submit(SubmitTrigger::Manual, Utc::now());
        let before = session.snapshot(Utc::now());

        assert!(matches!(
            session.set_answer("q1", AnswerValue::SingleChoice("C".into())),
            Err(Error::SessionClosed)
        ));
        assert!(matches!(session.clear_answer("q1"), Err(Error::SessionClosed)));
        assert!(matches!(session.toggle_flag("q2"), Err(Error::SessionClosed)));
        assert!(matches!(session.go_to(2), Err(Error::SessionClosed)));
        assert!(matches!(session.next(), Err(Error::SessionClosed)));

        let after = session.snapshot(before.saved_at);
        assert_eq!(before, after);
    }

    #[test]
    fn empty_values_count_as_unanswered() {
        let mut session = started(60);
        session
            .set_answer("q1", AnswerValue::SingleChoice(String::new()))
            .unwrap();
        session
            .set_answer("q2", AnswerValue::MultipleChoice(BTreeSet::new()))
            .unwrap();
        session
            .set_answer("q3", AnswerValue::Numeric(f64::NAN))
            .unwrap();
        for idx in 0..3 {
            assert_eq!(session.status_of(idx).unwrap().display(), DisplayStatus::Unanswered);
        }

        session.set_answer("q3", AnswerValue::Numeric(0.0)).unwrap();
        assert!(session.status_of(2).unwrap().answered);
    }

    #[test]
    fn answered_and_flagged_are_reported_together() {
        let mut session = started(60);
        session
            .set_answer("q1", AnswerValue::SingleChoice("A".into()))
            .unwrap();
        session.toggle_flag("q1").unwrap();
        session.toggle_flag("q2").unwrap();

        let q1 = session.status_of(0).unwrap();
        assert!(q1.answered && q1.flagged);
        assert_eq!(session.status_of(1).unwrap().display(), DisplayStatus::Marked);
        let overview = session.overview();
        assert_eq!((overview.answered, overview.flagged, overview.unanswered), (1, 2, 2));
    }

    #[test]
    fn expiry_submits_with_timeout_trigger() {
        let mut session = started(2);
        session
            .set_answer("q1", AnswerValue::SingleChoice("B".into()))
            .unwrap();
        assert_eq!(session.tick(Utc::now()), TickOutcome::Running(1));
        let TickOutcome::Expired(submission) = session.tick(Utc::now()) else {
            panic!("expected the clock to expire");
        };
        assert_eq!(submission.record.trigger, SubmitTrigger::Timeout);
        assert_eq!(submission.record.time_taken_seconds, 2);
        assert!(session.is_submitted());
        assert_eq!(session.tick(Utc::now()), TickOutcome::Inactive);
    }

    #[test]
    fn unknown_questions_and_bad_shapes_are_rejected() {
        let mut session = started(60);
        assert!(matches!(
            session.set_answer("q9", AnswerValue::Numeric(1.0)),
            Err(Error::UnknownQuestion(_))
        ));
        assert!(matches!(
            session.set_answer("q1", AnswerValue::Numeric(1.0)),
            Err(Error::InvalidAnswer(_))
        ));
        assert_eq!(session.get_answer("q1").unwrap(), None);
    }

    #[test]
    fn restore_brings_back_draft_state() {
        let mut session = started(60);
        session
            .set_answer("q2", AnswerValue::MultipleChoice(["A".to_string()].into()))
            .unwrap();
        session.toggle_flag("q3").unwrap();
        session.go_to(2).unwrap();
        for _ in 0..10 {
            session.tick(Utc::now());
        }
        let mut draft = session.snapshot(Utc::now());
        draft.answers.insert("gone".into(), AnswerValue::Numeric(1.0));

        let restored = TestSession::restore(session.test().clone(), draft).unwrap();
        assert_eq!(restored.remaining_seconds(), 50);
        assert_eq!(restored.current_index(), 2);
        assert_eq!(restored.current_section(), 1);
        assert!(restored.is_flagged("q3"));
        assert!(restored.get_answer("q2").unwrap().is_some());
        assert_eq!(restored.get_answer("q1").unwrap(), None);
        assert_eq!(restored.clock_state(), ClockState::Running);
        assert_eq!(restored.started_at(), session.started_at());
    }

    #[test]
    fn restoring_an_exhausted_draft_is_expired_but_open() {
        let session = started(60);
        let mut draft = session.snapshot(Utc::now());
        draft.remaining_seconds = 0;
        let mut restored = TestSession::restore(session.test().clone(), draft).unwrap();
        assert!(restored.is_expired_unsubmitted());
        let submission = restored.submit(SubmitTrigger::Timeout, Utc::now());
        assert_eq!(submission.record.time_taken_seconds, 60);
    }
}
