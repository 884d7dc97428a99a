use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::engine::navigation::{DisplayStatus, Overview};
use crate::engine::{AutosaveStatus, PersistenceStatus, SubmissionReceipt, TestSession};
use crate::models::answer::AnswerValue;
use crate::models::question::PublicQuestion;
use crate::models::test_attempt::{AttemptRecord, SessionStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetAnswerRequest {
    pub answer: AnswerValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub question_id: String,
    pub answer: Option<AnswerValue>,
    pub answered: bool,
    pub flagged: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagResponse {
    pub question_id: String,
    pub flagged: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NavigationAction {
    Next,
    Previous,
    GoTo,
    Section,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NavigationRequest {
    pub action: NavigationAction,
    #[validate(range(max = 100000))]
    pub index: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitRequest {
    #[validate(custom(function = "require_confirmation"))]
    pub confirmed: bool,
}

fn require_confirmation(confirmed: &bool) -> Result<(), ValidationError> {
    if *confirmed {
        Ok(())
    } else {
        Err(ValidationError::new("confirmation_required"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionStatusView {
    pub index: usize,
    pub question_id: String,
    pub answered: bool,
    pub flagged: bool,
    pub display: DisplayStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub attempt_id: Uuid,
    pub test_id: Uuid,
    pub title: String,
    pub status: SessionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub duration_seconds: u32,
    pub remaining_seconds: u32,
    pub current_index: usize,
    pub current_section: usize,
    pub section_count: usize,
    pub current_question: PublicQuestion,
    pub current_answer: Option<AnswerValue>,
    pub questions: Vec<QuestionStatusView>,
    pub overview: Overview,
    pub autosave: AutosaveStatus,
    pub submission: Option<AttemptRecord>,
}

impl SessionView {
    pub fn build(session: &TestSession, autosave: AutosaveStatus) -> Self {
        let current = session.current_question();
        let questions = session
            .test()
            .questions
            .iter()
            .zip(session.statuses())
            .enumerate()
            .map(|(index, (q, status))| QuestionStatusView {
                index,
                question_id: q.id.clone(),
                answered: status.answered,
                flagged: status.flagged,
                display: status.display(),
            })
            .collect();

        Self {
            attempt_id: session.attempt_id(),
            test_id: session.test().id,
            title: session.test().title.clone(),
            status: session.status(),
            started_at: session.started_at(),
            duration_seconds: session.duration_seconds(),
            remaining_seconds: session.remaining_seconds(),
            current_index: session.current_index(),
            current_section: session.current_section(),
            section_count: session.section_count(),
            current_question: PublicQuestion::from(current),
            current_answer: session.get_answer(&current.id).ok().flatten().cloned(),
            questions,
            overview: session.overview(),
            autosave,
            submission: session.record().cloned(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub attempt_id: Uuid,
    pub status: SessionStatus,
    pub already_submitted: bool,
    pub persisted: bool,
    pub persistence: PersistenceStatus,
    pub time_taken_seconds: u32,
    pub message: String,
}

impl From<SubmissionReceipt> for SubmitResponse {
    fn from(receipt: SubmissionReceipt) -> Self {
        let message = match &receipt.persistence {
            PersistenceStatus::Saved => "Test submitted successfully.".to_string(),
            PersistenceStatus::Pending => "Test submitted. Saving your results...".to_string(),
            PersistenceStatus::Failed { .. } => {
                "Your test was submitted, but we could not save your results. Please contact support."
                    .to_string()
            }
        };
        Self {
            attempt_id: receipt.record.attempt_id,
            status: SessionStatus::Submitted,
            already_submitted: receipt.already_submitted,
            persisted: receipt.persisted(),
            persistence: receipt.persistence,
            time_taken_seconds: receipt.record.time_taken_seconds,
            message,
        }
    }
}
