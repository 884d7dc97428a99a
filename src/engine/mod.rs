//! The test session engine: per-attempt state and the scheduled work that
//! drives it.

pub mod answer_store;
pub mod clock;
pub mod navigation;
pub mod review_flags;
pub mod runtime;
pub mod session;

use std::time::Duration;

pub use navigation::{DisplayStatus, Overview, QuestionStatus};
pub use runtime::{AutosaveStatus, PersistenceStatus, SessionHandle, SubmissionReceipt};
pub use session::{Submission, TestSession, TickOutcome};

#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub tick_interval: Duration,
    pub autosave_interval: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            autosave_interval: Duration::from_secs(10),
        }
    }
}
