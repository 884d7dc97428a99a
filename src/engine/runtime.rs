use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, MutexGuard};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::database::store::SessionStore;
use crate::engine::session::{Submission, TestSession, TickOutcome};
use crate::engine::EngineSettings;
use crate::error::Result;
use crate::models::test_attempt::{AttemptRecord, SubmitTrigger};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AutosaveStatus {
    Idle,
    Saving,
    Saved { at: DateTime<Utc> },
    Failed { at: DateTime<Utc>, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PersistenceStatus {
    Pending,
    Saved,
    Failed { reason: String },
}

/// What a submit call hands back to its caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmissionReceipt {
    pub record: AttemptRecord,
    pub already_submitted: bool,
    pub persistence: PersistenceStatus,
}

impl SubmissionReceipt {
    pub fn persisted(&self) -> bool {
        self.persistence == PersistenceStatus::Saved
    }
}

/// A live session together with its scheduled work: the one-second clock
/// and the autosave ticker. Both stop when the token is cancelled.
pub struct SessionHandle {
    attempt_id: Uuid,
    user_id: Uuid,
    session: Mutex<TestSession>,
    store: Arc<dyn SessionStore>,
    settings: EngineSettings,
    cancel: CancellationToken,
    autosave: watch::Sender<AutosaveStatus>,
    persistence: watch::Sender<Option<PersistenceStatus>>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("attempt_id", &self.attempt_id)
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

impl SessionHandle {
    /// Wraps the session without scheduling anything. Call `start` once the
    /// handle is registered.
    pub fn new(
        session: TestSession,
        store: Arc<dyn SessionStore>,
        settings: EngineSettings,
    ) -> Arc<Self> {
        let (autosave, _) = watch::channel(AutosaveStatus::Idle);
        let (persistence, _) = watch::channel(None);
        Arc::new(Self {
            attempt_id: session.attempt_id(),
            user_id: session.user_id(),
            session: Mutex::new(session),
            store,
            settings,
            cancel: CancellationToken::new(),
            autosave,
            persistence,
        })
    }

    /// Handle for an attempt whose record is already stored. Nothing is
    /// scheduled and a repeated submit reports the record as saved.
    pub fn recorded(
        session: TestSession,
        store: Arc<dyn SessionStore>,
        settings: EngineSettings,
    ) -> Arc<Self> {
        let handle = Self::new(session, store, settings);
        handle.cancel.cancel();
        handle.persistence.send_replace(Some(PersistenceStatus::Saved));
        handle
    }

    pub async fn launch(
        session: TestSession,
        store: Arc<dyn SessionStore>,
        settings: EngineSettings,
    ) -> Arc<Self> {
        let handle = Self::new(session, store, settings);
        handle.start().await;
        handle
    }

    /// Spawns the clock and autosave tasks. A restored session whose time
    /// already ran out is submitted right away instead.
    pub async fn start(self: &Arc<Self>) {
        let (submitted, expired) = {
            let session = self.session.lock().await;
            (session.is_submitted(), session.is_expired_unsubmitted())
        };
        if submitted || self.cancel.is_cancelled() {
            return;
        }
        if expired {
            tracing::info!(attempt_id = %self.attempt_id, "draft time exhausted, submitting on resume");
            self.submit(SubmitTrigger::Timeout).await;
            return;
        }

        tokio::spawn(run_clock(self.clone()));
        tokio::spawn(run_autosave(self.clone()));
    }

    pub fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    /// Exclusive access to the session state. Never held across store I/O.
    pub async fn lock(&self) -> MutexGuard<'_, TestSession> {
        self.session.lock().await
    }

    pub async fn with_session<R>(&self, f: impl FnOnce(&mut TestSession) -> Result<R>) -> Result<R> {
        let mut session = self.session.lock().await;
        f(&mut session)
    }

    pub fn autosave_status(&self) -> AutosaveStatus {
        self.autosave.borrow().clone()
    }

    /// Resolves once the session was submitted and its record write finished.
    pub async fn closed(&self) -> PersistenceStatus {
        let mut persistence = self.persistence.subscribe();
        let status = match persistence.wait_for(Option::is_some).await {
            Ok(status) => (*status).clone().unwrap_or(PersistenceStatus::Pending),
            Err(_) => PersistenceStatus::Pending,
        };
        status
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Freezes the session and stops its timers. Only the first call
    /// persists the attempt record; later calls return the same record.
    pub async fn submit(&self, trigger: SubmitTrigger) -> SubmissionReceipt {
        let submission = self.session.lock().await.submit(trigger, Utc::now());
        self.cancel.cancel();
        self.finish(submission).await
    }

    async fn finish(&self, submission: Submission) -> SubmissionReceipt {
        if !submission.first {
            let persistence = self
                .persistence
                .borrow()
                .clone()
                .unwrap_or(PersistenceStatus::Pending);
            return SubmissionReceipt {
                record: submission.record,
                already_submitted: true,
                persistence,
            };
        }

        let record = submission.record;
        tracing::info!(
            attempt_id = %record.attempt_id,
            trigger = record.trigger.as_str(),
            time_taken_seconds = record.time_taken_seconds,
            answers = record.answers.len(),
            "attempt submitted"
        );

        let persistence = match self.store.save_attempt(&record).await {
            Ok(()) => PersistenceStatus::Saved,
            Err(e) => {
                tracing::warn!(attempt_id = %record.attempt_id, error = ?e, "failed to persist attempt record");
                PersistenceStatus::Failed {
                    reason: e.to_string(),
                }
            }
        };
        self.persistence.send_replace(Some(persistence.clone()));

        SubmissionReceipt {
            record,
            already_submitted: false,
            persistence,
        }
    }
}

async fn run_clock(handle: Arc<SessionHandle>) {
    let period = handle.settings.tick_interval;
    let mut ticks = interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Burst);

    loop {
        tokio::select! {
            biased;
            _ = handle.cancel.cancelled() => break,
            _ = ticks.tick() => {}
        }

        let outcome = handle.session.lock().await.tick(Utc::now());
        match outcome {
            TickOutcome::Running(remaining) => {
                tracing::trace!(attempt_id = %handle.attempt_id, remaining, "clock tick");
            }
            TickOutcome::Expired(submission) => {
                handle.cancel.cancel();
                let receipt = handle.finish(submission).await;
                if !receipt.persisted() {
                    tracing::error!(attempt_id = %handle.attempt_id, "timed-out attempt was not persisted");
                }
                break;
            }
            TickOutcome::Inactive => break,
        }
    }
    tracing::debug!(attempt_id = %handle.attempt_id, "session clock stopped");
}

async fn run_autosave(handle: Arc<SessionHandle>) {
    let period = handle.settings.autosave_interval;
    let mut ticks = interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = handle.cancel.cancelled() => break,
            _ = ticks.tick() => {}
        }

        let snapshot = {
            let session = handle.session.lock().await;
            if session.is_submitted() {
                break;
            }
            session.snapshot(Utc::now())
        };

        handle.autosave.send_replace(AutosaveStatus::Saving);
        let status = match handle.store.save_draft(&snapshot).await {
            Ok(()) => AutosaveStatus::Saved { at: snapshot.saved_at },
            Err(e) => {
                tracing::warn!(attempt_id = %handle.attempt_id, error = ?e, "autosave failed, retrying on next tick");
                AutosaveStatus::Failed {
                    at: Utc::now(),
                    reason: e.to_string(),
                }
            }
        };
        handle.autosave.send_replace(status);
    }
    tracing::debug!(attempt_id = %handle.attempt_id, "autosave stopped");
}
