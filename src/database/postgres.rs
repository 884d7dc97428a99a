use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::database::store::SessionStore;
use crate::error::{Error, Result};
use crate::models::test::TestDefinition;
use crate::models::test_attempt::{AttemptRecord, SessionSnapshot, SubmitTrigger};

#[derive(Debug, FromRow)]
struct TestRow {
    id: Uuid,
    title: String,
    duration_minutes: i32,
    passing_score: f64,
    questions: JsonValue,
}

#[derive(Debug, FromRow)]
struct DraftRow {
    snapshot: JsonValue,
}

#[derive(Debug, FromRow)]
struct AttemptRow {
    id: Uuid,
    test_id: Uuid,
    user_id: Uuid,
    started_at: DateTime<Utc>,
    submitted_at: DateTime<Utc>,
    time_taken_seconds: i32,
    trigger: String,
    answers: JsonValue,
}

impl TryFrom<AttemptRow> for AttemptRecord {
    type Error = Error;

    fn try_from(row: AttemptRow) -> Result<Self> {
        let trigger = SubmitTrigger::parse(&row.trigger).ok_or_else(|| {
            Error::Internal(format!("attempt {} has unknown trigger {}", row.id, row.trigger))
        })?;
        Ok(AttemptRecord {
            attempt_id: row.id,
            test_id: row.test_id,
            user_id: row.user_id,
            started_at: row.started_at,
            submitted_at: row.submitted_at,
            time_taken_seconds: u32::try_from(row.time_taken_seconds).unwrap_or(0),
            trigger,
            answers: serde_json::from_value(row.answers)?,
        })
    }
}

#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn load_test(&self, test_id: Uuid) -> Result<TestDefinition> {
        let row = sqlx::query_as::<_, TestRow>(
            r#"SELECT id, title, duration_minutes, passing_score, questions FROM tests WHERE id = $1"#,
        )
        .bind(test_id)
        .fetch_one(&self.pool)
        .await?;

        let duration_minutes = u32::try_from(row.duration_minutes).map_err(|_| {
            Error::InvalidTest(format!("test {} has a negative duration", row.id))
        })?;
        Ok(TestDefinition {
            id: row.id,
            title: row.title,
            duration_minutes,
            passing_score: row.passing_score,
            questions: serde_json::from_value(row.questions)?,
        })
    }

    async fn save_draft(&self, snapshot: &SessionSnapshot) -> Result<()> {
        let payload = serde_json::to_value(snapshot)?;
        sqlx::query(
            r#"
            INSERT INTO session_drafts (attempt_id, test_id, user_id, snapshot, remaining_seconds, saved_at)
            SELECT $1, $2, $3, $4, $5, $6
            WHERE NOT EXISTS (SELECT 1 FROM test_attempts WHERE id = $1)
            ON CONFLICT (attempt_id) DO UPDATE
            SET snapshot = EXCLUDED.snapshot,
                remaining_seconds = EXCLUDED.remaining_seconds,
                saved_at = EXCLUDED.saved_at
            WHERE session_drafts.saved_at <= EXCLUDED.saved_at
            "#,
        )
        .bind(snapshot.attempt_id)
        .bind(snapshot.test_id)
        .bind(snapshot.user_id)
        .bind(payload)
        .bind(snapshot.remaining_seconds as i32)
        .bind(snapshot.saved_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_draft(&self, attempt_id: Uuid) -> Result<Option<SessionSnapshot>> {
        let row = sqlx::query_as::<_, DraftRow>(
            r#"SELECT snapshot FROM session_drafts WHERE attempt_id = $1"#,
        )
        .bind(attempt_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(serde_json::from_value(row.snapshot)?)),
            None => Ok(None),
        }
    }

    async fn save_attempt(&self, record: &AttemptRecord) -> Result<()> {
        let answers = serde_json::to_value(&record.answers)?;
        sqlx::query(
            r#"
            INSERT INTO test_attempts (
                id, test_id, user_id, started_at, submitted_at, time_taken_seconds, trigger, answers
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(record.attempt_id)
        .bind(record.test_id)
        .bind(record.user_id)
        .bind(record.started_at)
        .bind(record.submitted_at)
        .bind(record.time_taken_seconds as i32)
        .bind(record.trigger.as_str())
        .bind(answers)
        .execute(&self.pool)
        .await?;

        sqlx::query(r#"DELETE FROM session_drafts WHERE attempt_id = $1"#)
            .bind(record.attempt_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn load_attempt(&self, attempt_id: Uuid) -> Result<Option<AttemptRecord>> {
        let row = sqlx::query_as::<_, AttemptRow>(
            r#"
            SELECT id, test_id, user_id, started_at, submitted_at, time_taken_seconds, trigger, answers
            FROM test_attempts
            WHERE id = $1
            "#,
        )
        .bind(attempt_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(AttemptRecord::try_from).transpose()
    }
}
