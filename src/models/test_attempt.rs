use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::models::answer::AnswerValue;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Submitted,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubmitTrigger {
    Manual,
    Timeout,
}

impl SubmitTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmitTrigger::Manual => "manual",
            SubmitTrigger::Timeout => "timeout",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "manual" => Some(SubmitTrigger::Manual),
            "timeout" => Some(SubmitTrigger::Timeout),
            _ => None,
        }
    }
}

/// Immutable record emitted once per attempt at submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttemptRecord {
    pub attempt_id: Uuid,
    pub test_id: Uuid,
    pub user_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub submitted_at: DateTime<Utc>,
    pub time_taken_seconds: u32,
    pub trigger: SubmitTrigger,
    pub answers: BTreeMap<String, AnswerValue>,
}

/// Draft state handed to the store by autosave; enough to resume.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSnapshot {
    pub attempt_id: Uuid,
    pub test_id: Uuid,
    pub user_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: u32,
    pub remaining_seconds: u32,
    pub current_index: usize,
    pub answers: BTreeMap<String, AnswerValue>,
    pub flags: BTreeSet<String>,
    pub saved_at: DateTime<Utc>,
}
