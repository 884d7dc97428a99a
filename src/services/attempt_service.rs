use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::database::store::SessionStore;
use crate::engine::{EngineSettings, PersistenceStatus, SessionHandle, SubmissionReceipt, TestSession};
use crate::error::{Error, Result};
use crate::models::test::TestDefinition;
use crate::models::test_attempt::SubmitTrigger;
use crate::models::user::{CurrentUser, Role};
use crate::services::grading_service::{GradingService, ScoreReport};

/// Registry of live attempts. Starts, resumes and looks up sessions on
/// behalf of an explicitly passed caller. A handle leaves the registry once
/// its attempt record is stored; later lookups read the stored record.
#[derive(Clone)]
pub struct AttemptService {
    store: Arc<dyn SessionStore>,
    settings: EngineSettings,
    sessions: Arc<RwLock<HashMap<Uuid, Arc<SessionHandle>>>>,
}

impl AttemptService {
    pub fn new(store: Arc<dyn SessionStore>, settings: EngineSettings) -> Self {
        Self {
            store,
            settings,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn settings(&self) -> EngineSettings {
        self.settings
    }

    async fn load_test(&self, test_id: Uuid) -> Result<Arc<TestDefinition>> {
        let test = self.store.load_test(test_id).await?;
        test.validate()?;
        Ok(Arc::new(test))
    }

    fn ensure_student(user: &CurrentUser) -> Result<()> {
        if user.role != Role::Student {
            return Err(Error::Forbidden("only students can take tests".to_string()));
        }
        Ok(())
    }

    fn ensure_owner(user: &CurrentUser, owner: Uuid) -> Result<()> {
        if user.id != owner {
            return Err(Error::Forbidden("attempt belongs to another user".to_string()));
        }
        Ok(())
    }

    async fn live(&self, attempt_id: Uuid) -> Option<Arc<SessionHandle>> {
        self.sessions.read().await.get(&attempt_id).cloned()
    }

    /// Starts the handle's timers and drops it from the registry once its
    /// record is stored. A handle whose record could not be written stays,
    /// since it holds the only copy.
    async fn activate(&self, handle: &Arc<SessionHandle>) {
        handle.start().await;

        let sessions = self.sessions.clone();
        let handle = handle.clone();
        tokio::spawn(async move {
            let persistence = handle.closed().await;
            if persistence == PersistenceStatus::Saved {
                sessions.write().await.remove(&handle.attempt_id());
                tracing::debug!(attempt_id = %handle.attempt_id(), "submitted session released");
            }
        });
    }

    /// Starts a new attempt. The clock begins here, never earlier.
    pub async fn start_session(
        &self,
        user: &CurrentUser,
        test_id: Uuid,
    ) -> Result<Arc<SessionHandle>> {
        Self::ensure_student(user)?;
        let test = self.load_test(test_id).await?;
        let duration = test.duration_seconds();
        let attempt_id = Uuid::new_v4();
        let session = TestSession::start(attempt_id, user.id, test, duration, Utc::now())?;
        let handle = SessionHandle::new(session, self.store.clone(), self.settings);

        self.sessions.write().await.insert(attempt_id, handle.clone());
        self.activate(&handle).await;
        tracing::info!(%attempt_id, %test_id, user_id = %user.id, duration, "test session started");
        Ok(handle)
    }

    /// Returns the live session, or rebuilds it from the latest draft. An
    /// attempt that was already submitted is never reopened.
    pub async fn resume_session(
        &self,
        user: &CurrentUser,
        attempt_id: Uuid,
    ) -> Result<Arc<SessionHandle>> {
        Self::ensure_student(user)?;
        if let Some(handle) = self.live(attempt_id).await {
            Self::ensure_owner(user, handle.user_id())?;
            if handle.is_stopped() {
                return Err(Error::SessionClosed);
            }
            return Ok(handle);
        }

        if let Some(record) = self.store.load_attempt(attempt_id).await? {
            Self::ensure_owner(user, record.user_id)?;
            return Err(Error::SessionClosed);
        }

        let draft = self
            .store
            .load_draft(attempt_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no draft for attempt {}", attempt_id)))?;
        Self::ensure_owner(user, draft.user_id)?;

        let test = self.load_test(draft.test_id).await?;
        let remaining = draft.remaining_seconds;
        let session = TestSession::restore(test, draft)?;
        let handle = SessionHandle::new(session, self.store.clone(), self.settings);

        {
            let mut sessions = self.sessions.write().await;
            // Another request may have resumed the same attempt meanwhile.
            if let Some(existing) = sessions.get(&attempt_id) {
                return Ok(existing.clone());
            }
            sessions.insert(attempt_id, handle.clone());
        }
        self.activate(&handle).await;
        tracing::info!(%attempt_id, user_id = %user.id, remaining, "test session resumed");
        Ok(handle)
    }

    /// Frozen handle for an attempt that only exists as a stored record.
    async fn recorded_session(&self, attempt_id: Uuid) -> Result<Arc<SessionHandle>> {
        let record = self
            .store
            .load_attempt(attempt_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("attempt {} not found", attempt_id)))?;
        let test = self.load_test(record.test_id).await?;
        let session = TestSession::from_record(test, record)?;
        Ok(SessionHandle::recorded(session, self.store.clone(), self.settings))
    }

    /// Lookup for reads: owners and staff.
    pub async fn session(&self, user: &CurrentUser, attempt_id: Uuid) -> Result<Arc<SessionHandle>> {
        let handle = match self.live(attempt_id).await {
            Some(handle) => handle,
            None => self.recorded_session(attempt_id).await?,
        };
        if !user.can_view(handle.user_id()) {
            return Err(Error::Forbidden("attempt belongs to another user".to_string()));
        }
        Ok(handle)
    }

    /// Lookup for writes: the owner only.
    pub async fn owned_session(
        &self,
        user: &CurrentUser,
        attempt_id: Uuid,
    ) -> Result<Arc<SessionHandle>> {
        let handle = self.session(user, attempt_id).await?;
        Self::ensure_owner(user, handle.user_id())?;
        Ok(handle)
    }

    pub async fn submit(
        &self,
        user: &CurrentUser,
        attempt_id: Uuid,
        trigger: SubmitTrigger,
    ) -> Result<SubmissionReceipt> {
        let handle = self.owned_session(user, attempt_id).await?;
        Ok(handle.submit(trigger).await)
    }

    pub async fn result(&self, user: &CurrentUser, attempt_id: Uuid) -> Result<ScoreReport> {
        let handle = self.session(user, attempt_id).await?;
        let session = handle.lock().await;
        let record = session.record().ok_or_else(|| {
            Error::BadRequest("results are available after submission".to_string())
        })?;
        Ok(GradingService::grade(session.test(), record))
    }

    /// Sessions still in progress.
    pub async fn active_count(&self) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .filter(|handle| !handle.is_stopped())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::store::MockSessionStore;
    use crate::database::memory::MemorySessionStore;
    use crate::engine::AutosaveStatus;
    use crate::models::answer::AnswerValue;
    use crate::models::question::{CorrectAnswer, Question, QuestionOption, QuestionType};
    use crate::models::test_attempt::SessionStatus;
    use std::time::Duration;

    fn test_definition(id: Uuid) -> TestDefinition {
        TestDefinition {
            id,
            title: "Mock".into(),
            duration_minutes: 1,
            passing_score: 50.0,
            questions: vec![Question {
                id: "q1".into(),
                question_type: QuestionType::SingleChoice,
                text: "Pick B".into(),
                options: vec![
                    QuestionOption {
                        id: "A".into(),
                        text: "A".into(),
                    },
                    QuestionOption {
                        id: "B".into(),
                        text: "B".into(),
                    },
                ],
                marks: 1,
                correct_answer: CorrectAnswer::Single("B".into()),
                section: None,
            }],
        }
    }

    fn student() -> CurrentUser {
        CurrentUser::new(Uuid::new_v4(), Role::Student)
    }

    #[tokio::test(start_paused = true)]
    async fn failing_autosave_does_not_stop_the_session() {
        let test_id = Uuid::new_v4();
        let mut store = MockSessionStore::new();
        store
            .expect_load_test()
            .returning(move |_| Ok(test_definition(test_id)));
        store
            .expect_save_draft()
            .returning(|_| Err(Error::Internal("draft store unavailable".into())));
        store.expect_save_attempt().returning(|_| Ok(()));

        let service = AttemptService::new(Arc::new(store), EngineSettings::default());
        let user = student();
        let handle = service.start_session(&user, test_id).await.unwrap();

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert!(matches!(handle.autosave_status(), AutosaveStatus::Failed { .. }));

        handle
            .with_session(|s| s.set_answer("q1", AnswerValue::SingleChoice("B".into())))
            .await
            .unwrap();
        let session = handle.lock().await;
        assert_eq!(session.status(), SessionStatus::InProgress);
        assert_eq!(session.remaining_seconds(), 50);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_attempt_persistence_keeps_the_session_closed() {
        let test_id = Uuid::new_v4();
        let mut store = MockSessionStore::new();
        store
            .expect_load_test()
            .returning(move |_| Ok(test_definition(test_id)));
        store.expect_save_draft().returning(|_| Ok(()));
        store
            .expect_save_attempt()
            .times(1)
            .returning(|_| Err(Error::Internal("attempt store unavailable".into())));

        let service = AttemptService::new(Arc::new(store), EngineSettings::default());
        let user = student();
        let handle = service.start_session(&user, test_id).await.unwrap();
        let attempt_id = handle.attempt_id();

        let receipt = service
            .submit(&user, attempt_id, SubmitTrigger::Manual)
            .await
            .unwrap();
        assert!(!receipt.persisted());
        assert!(matches!(receipt.persistence, PersistenceStatus::Failed { .. }));

        let again = service
            .submit(&user, attempt_id, SubmitTrigger::Manual)
            .await
            .unwrap();
        assert!(again.already_submitted);
        assert_eq!(again.record, receipt.record);

        let err = handle
            .with_session(|s| s.set_answer("q1", AnswerValue::SingleChoice("A".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SessionClosed));
    }

    async fn memory_service() -> (AttemptService, Arc<MemorySessionStore>, Uuid) {
        let store = Arc::new(MemorySessionStore::new());
        let test = test_definition(Uuid::new_v4());
        let test_id = test.id;
        store.insert_test(test).await.unwrap();
        let service = AttemptService::new(store.clone(), EngineSettings::default());
        (service, store, test_id)
    }

    #[tokio::test(start_paused = true)]
    async fn submitted_sessions_leave_the_registry() {
        let (service, _store, test_id) = memory_service().await;
        let user = student();

        let mut attempts = Vec::new();
        for _ in 0..25 {
            let handle = service.start_session(&user, test_id).await.unwrap();
            let receipt = service
                .submit(&user, handle.attempt_id(), SubmitTrigger::Manual)
                .await
                .unwrap();
            assert!(receipt.persisted());
            attempts.push(handle.attempt_id());
        }
        let open = service.start_session(&user, test_id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(service.active_count().await, 1);
        assert_eq!(service.sessions.read().await.len(), 1);
        assert!(service.sessions.read().await.contains_key(&open.attempt_id()));

        let report = service.result(&user, attempts[0]).await.unwrap();
        assert_eq!(report.attempt_id, attempts[0]);
        let err = service
            .owned_session(&user, attempts[0])
            .await
            .unwrap()
            .with_session(|s| s.set_answer("q1", AnswerValue::SingleChoice("B".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SessionClosed));
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_sessions_are_released_too() {
        let (service, store, test_id) = memory_service().await;
        let user = student();
        let handle = service.start_session(&user, test_id).await.unwrap();

        tokio::time::sleep(Duration::from_millis(60_100)).await;

        assert_eq!(service.active_count().await, 0);
        assert!(service.sessions.read().await.is_empty());
        let record = store.attempt(handle.attempt_id()).await.unwrap();
        assert_eq!(record.trigger, SubmitTrigger::Timeout);
        assert_eq!(record.time_taken_seconds, 60);
    }

    #[tokio::test(start_paused = true)]
    async fn resuming_a_recorded_attempt_is_refused() {
        let (service, _store, test_id) = memory_service().await;
        let user = student();
        let handle = service.start_session(&user, test_id).await.unwrap();
        let attempt_id = handle.attempt_id();
        service
            .submit(&user, attempt_id, SubmitTrigger::Manual)
            .await
            .unwrap();

        let err = service.resume_session(&user, attempt_id).await.unwrap_err();
        assert!(matches!(err, Error::SessionClosed));

        let stranger = student();
        let err = service
            .resume_session(&stranger, attempt_id)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }

    #[tokio::test]
    async fn staff_cannot_start_attempts() {
        let store = MockSessionStore::new();
        let service = AttemptService::new(Arc::new(store), EngineSettings::default());
        let admin = CurrentUser::new(Uuid::new_v4(), Role::Admin);
        let err = service
            .start_session(&admin, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }
}
