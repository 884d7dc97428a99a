use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::database::store::SessionStore;
use crate::error::{Error, Result};
use crate::models::test::TestDefinition;
use crate::models::test_attempt::{AttemptRecord, SessionSnapshot};

/// In-process store used when no database is configured and in tests.
#[derive(Default)]
pub struct MemorySessionStore {
    tests: RwLock<HashMap<Uuid, TestDefinition>>,
    drafts: RwLock<HashMap<Uuid, SessionSnapshot>>,
    attempts: RwLock<HashMap<Uuid, AttemptRecord>>,
    draft_writes: AtomicUsize,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_test(&self, test: TestDefinition) -> Result<()> {
        test.validate()?;
        self.tests.write().await.insert(test.id, test);
        Ok(())
    }

    pub async fn attempt(&self, attempt_id: Uuid) -> Option<AttemptRecord> {
        self.attempts.read().await.get(&attempt_id).cloned()
    }

    pub async fn draft(&self, attempt_id: Uuid) -> Option<SessionSnapshot> {
        self.drafts.read().await.get(&attempt_id).cloned()
    }

    /// Number of draft writes accepted so far.
    pub fn draft_writes(&self) -> usize {
        self.draft_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load_test(&self, test_id: Uuid) -> Result<TestDefinition> {
        self.tests
            .read()
            .await
            .get(&test_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("test {} not found", test_id)))
    }

    async fn save_draft(&self, snapshot: &SessionSnapshot) -> Result<()> {
        let attempts = self.attempts.read().await;
        if attempts.contains_key(&snapshot.attempt_id) {
            tracing::debug!(attempt_id = %snapshot.attempt_id, "draft ignored, attempt already recorded");
            return Ok(());
        }
        self.drafts
            .write()
            .await
            .insert(snapshot.attempt_id, snapshot.clone());
        self.draft_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load_draft(&self, attempt_id: Uuid) -> Result<Option<SessionSnapshot>> {
        Ok(self.drafts.read().await.get(&attempt_id).cloned())
    }

    async fn save_attempt(&self, record: &AttemptRecord) -> Result<()> {
        let mut attempts = self.attempts.write().await;
        if attempts.contains_key(&record.attempt_id) {
            return Err(Error::BadRequest(format!(
                "attempt {} has already been recorded",
                record.attempt_id
            )));
        }
        attempts.insert(record.attempt_id, record.clone());
        self.drafts.write().await.remove(&record.attempt_id);
        Ok(())
    }

    async fn load_attempt(&self, attempt_id: Uuid) -> Result<Option<AttemptRecord>> {
        Ok(self.attempts.read().await.get(&attempt_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_attempt::SubmitTrigger;
    use chrono::Utc;
    use std::collections::{BTreeMap, BTreeSet};

    fn snapshot(attempt_id: Uuid) -> SessionSnapshot {
        SessionSnapshot {
            attempt_id,
            test_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            started_at: Utc::now(),
            duration_seconds: 60,
            remaining_seconds: 40,
            current_index: 0,
            answers: BTreeMap::new(),
            flags: BTreeSet::new(),
            saved_at: Utc::now(),
        }
    }

    fn record(draft: &SessionSnapshot) -> AttemptRecord {
        AttemptRecord {
            attempt_id: draft.attempt_id,
            test_id: draft.test_id,
            user_id: draft.user_id,
            started_at: draft.started_at,
            submitted_at: Utc::now(),
            time_taken_seconds: 20,
            trigger: SubmitTrigger::Manual,
            answers: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn recording_an_attempt_discards_its_draft() {
        let store = MemorySessionStore::new();
        let draft = snapshot(Uuid::new_v4());
        store.save_draft(&draft).await.unwrap();

        store.save_attempt(&record(&draft)).await.unwrap();

        assert!(store.load_draft(draft.attempt_id).await.unwrap().is_none());
        assert!(store.load_attempt(draft.attempt_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn late_draft_after_submission_is_ignored() {
        let store = MemorySessionStore::new();
        let draft = snapshot(Uuid::new_v4());
        store.save_attempt(&record(&draft)).await.unwrap();

        store.save_draft(&draft).await.unwrap();

        assert!(store.draft(draft.attempt_id).await.is_none());
        assert_eq!(store.draft_writes(), 0);
    }

    #[tokio::test]
    async fn second_record_for_an_attempt_is_rejected() {
        let store = MemorySessionStore::new();
        let draft = snapshot(Uuid::new_v4());
        store.save_attempt(&record(&draft)).await.unwrap();
        let err = store.save_attempt(&record(&draft)).await.unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }
}
