use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::test::TestDefinition;
use crate::models::test_attempt::{AttemptRecord, SessionSnapshot};

/// Persistence seen by the session engine. Drafts are upserts keyed by
/// attempt id; attempt records are written once per submission and a
/// recorded attempt never gets a draft again.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load_test(&self, test_id: Uuid) -> Result<TestDefinition>;

    async fn save_draft(&self, snapshot: &SessionSnapshot) -> Result<()>;

    async fn load_draft(&self, attempt_id: Uuid) -> Result<Option<SessionSnapshot>>;

    async fn save_attempt(&self, record: &AttemptRecord) -> Result<()>;

    async fn load_attempt(&self, attempt_id: Uuid) -> Result<Option<AttemptRecord>>;
}
