/// Session Store
///
/// Persisted record of outstanding refresh tokens, keyed by their
/// unguessable `token_id`. The store is the only shared mutable state in
/// the authentication subsystem; `rotate` is its only compound mutation
/// and must be indivisible so one refresh token can never be spent twice.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::AppError;

/// One link of a refresh chain.
///
/// Active: `revoked == false`, `superseded_by == None`. Rotation marks the
/// old record revoked and points `superseded_by` at its replacement;
/// sign-out and replay escalation set `revoked` directly. At most one
/// record per chain is ever active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshRecord {
    pub token_id: String,
    pub subject_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub superseded_by: Option<String>,
}

impl RefreshRecord {
    pub fn new(token_id: String, subject_id: Uuid, expiry_seconds: i64) -> Self {
        let now = Utc::now();
        Self {
            token_id,
            subject_id,
            issued_at: now,
            expires_at: now + Duration::seconds(expiry_seconds),
            revoked: false,
            superseded_by: None,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.revoked && self.superseded_by.is_none()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Result of the conditional swap in [`SessionStore::rotate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotateOutcome {
    /// The old record was active; it is now superseded and the replacement
    /// is stored
    Rotated,
    /// The old record exists but was already rotated or revoked — the
    /// caller is looking at a replay
    NotActive,
    /// No record with that token id
    Missing,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, record: RefreshRecord) -> Result<(), AppError>;

    async fn find(&self, token_id: &str) -> Result<Option<RefreshRecord>, AppError>;

    /// Atomically supersede `old_token_id` with `replacement`.
    ///
    /// The check-and-swap is a single indivisible operation: of two
    /// concurrent calls against the same active record exactly one
    /// observes `Rotated`; the other observes `NotActive`.
    async fn rotate(
        &self,
        old_token_id: &str,
        replacement: RefreshRecord,
    ) -> Result<RotateOutcome, AppError>;

    /// Revoke one record. Revoking an already-revoked or unknown record is
    /// a no-op (sign-out is idempotent).
    async fn revoke(&self, token_id: &str) -> Result<(), AppError>;

    /// Revoke every record belonging to `subject_id`, across all of the
    /// subject's chains. Used for replay escalation and account deletion.
    async fn revoke_all_for_subject(&self, subject_id: Uuid) -> Result<(), AppError>;
}

/// Postgres-backed store. Pool acquisition is bounded by the configured
/// `acquire_timeout`, so an unreachable database surfaces as
/// `StoreUnavailable` instead of hanging the request.
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
    async fn insert(&self, record: RefreshRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (token_id, subject_id, issued_at, expires_at, revoked, superseded_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&record.token_id)
        .bind(record.subject_id)
        .bind(record.issued_at)
        .bind(record.expires_at)
        .bind(record.revoked)
        .bind(&record.superseded_by)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, token_id: &str) -> Result<Option<RefreshRecord>, AppError> {
        let row = sqlx::query_as::<
            _,
            (
                String,
                Uuid,
                DateTime<Utc>,
                DateTime<Utc>,
                bool,
                Option<String>,
            ),
        >(
            r#"
            SELECT token_id, subject_id, issued_at, expires_at, revoked, superseded_by
            FROM sessions
            WHERE token_id = $1
            "#,
        )
        .bind(token_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(
            |(token_id, subject_id, issued_at, expires_at, revoked, superseded_by)| RefreshRecord {
                token_id,
                subject_id,
                issued_at,
                expires_at,
                revoked,
                superseded_by,
            },
        ))
    }

    async fn rotate(
        &self,
        old_token_id: &str,
        replacement: RefreshRecord,
    ) -> Result<RotateOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        // Conditional UPDATE is the swap: only an active record matches,
        // so of two racing rotations only one touches a row.
        let updated = sqlx::query(
            r#"
            UPDATE sessions
            SET revoked = true, superseded_by = $1
            WHERE token_id = $2 AND revoked = false AND superseded_by IS NULL
            "#,
        )
        .bind(&replacement.token_id)
        .bind(old_token_id)
        .execute(&mut tx)
        .await?;

        if updated.rows_affected() == 0 {
            let exists = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM sessions WHERE token_id = $1",
            )
            .bind(old_token_id)
            .fetch_one(&mut tx)
            .await?;

            tx.rollback().await?;
            return Ok(if exists > 0 {
                RotateOutcome::NotActive
            } else {
                RotateOutcome::Missing
            });
        }

        sqlx::query(
            r#"
            INSERT INTO sessions (token_id, subject_id, issued_at, expires_at, revoked, superseded_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&replacement.token_id)
        .bind(replacement.subject_id)
        .bind(replacement.issued_at)
        .bind(replacement.expires_at)
        .bind(replacement.revoked)
        .bind(&replacement.superseded_by)
        .execute(&mut tx)
        .await?;

        tx.commit().await?;
        Ok(RotateOutcome::Rotated)
    }

    async fn revoke(&self, token_id: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE sessions SET revoked = true WHERE token_id = $1")
            .bind(token_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn revoke_all_for_subject(&self, subject_id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE sessions SET revoked = true WHERE subject_id = $1 AND revoked = false")
            .bind(subject_id)
            .execute(&self.pool)
            .await?;

        tracing::info!(subject_id = %subject_id, "All sessions revoked for subject");
        Ok(())
    }
}

/// In-memory store for tests. A single mutex guards the whole map, so the
/// rotation check-and-swap holds the lock for its full duration.
#[derive(Default)]
pub struct MemorySessionStore {
    records: Mutex<HashMap<String, RefreshRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, record: RefreshRecord) -> Result<(), AppError> {
        let mut records = self.records.lock().unwrap();
        records.insert(record.token_id.clone(), record);
        Ok(())
    }

    async fn find(&self, token_id: &str) -> Result<Option<RefreshRecord>, AppError> {
        let records = self.records.lock().unwrap();
        Ok(records.get(token_id).cloned())
    }

    async fn rotate(
        &self,
        old_token_id: &str,
        replacement: RefreshRecord,
    ) -> Result<RotateOutcome, AppError> {
        let mut records = self.records.lock().unwrap();

        let outcome = match records.get_mut(old_token_id) {
            None => return Ok(RotateOutcome::Missing),
            Some(old) if !old.is_active() => RotateOutcome::NotActive,
            Some(old) => {
                old.revoked = true;
                old.superseded_by = Some(replacement.token_id.clone());
                records.insert(replacement.token_id.clone(), replacement);
                RotateOutcome::Rotated
            }
        };

        Ok(outcome)
    }

    async fn revoke(&self, token_id: &str) -> Result<(), AppError> {
        let mut records = self.records.lock().unwrap();
        if let Some(record) = records.get_mut(token_id) {
            record.revoked = true;
        }
        Ok(())
    }

    async fn revoke_all_for_subject(&self, subject_id: Uuid) -> Result<(), AppError> {
        let mut records = self.records.lock().unwrap();
        for record in records.values_mut() {
            if record.subject_id == subject_id {
                record.revoked = true;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn record(token_id: &str, subject: Uuid) -> RefreshRecord {
        RefreshRecord::new(token_id.to_string(), subject, 3600)
    }

    #[tokio::test]
    async fn rotate_supersedes_the_old_record() {
        let store = MemorySessionStore::new();
        let subject = Uuid::new_v4();
        store.insert(record("old", subject)).await.unwrap();

        let outcome = store.rotate("old", record("new", subject)).await.unwrap();
        assert_eq!(outcome, RotateOutcome::Rotated);

        let old = store.find("old").await.unwrap().unwrap();
        assert!(old.revoked);
        assert_eq!(old.superseded_by.as_deref(), Some("new"));

        let new = store.find("new").await.unwrap().unwrap();
        assert!(new.is_active());
    }

    #[tokio::test]
    async fn rotate_refuses_a_superseded_record() {
        let store = MemorySessionStore::new();
        let subject = Uuid::new_v4();
        store.insert(record("old", subject)).await.unwrap();
        store.rotate("old", record("new", subject)).await.unwrap();

        let outcome = store
            .rotate("old", record("newer", subject))
            .await
            .unwrap();
        assert_eq!(outcome, RotateOutcome::NotActive);
        assert!(store.find("newer").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rotate_reports_missing_records() {
        let store = MemorySessionStore::new();
        let outcome = store
            .rotate("ghost", record("new", Uuid::new_v4()))
            .await
            .unwrap();
        assert_eq!(outcome, RotateOutcome::Missing);
    }

    #[tokio::test]
    async fn concurrent_rotations_succeed_exactly_once() {
        let store = Arc::new(MemorySessionStore::new());
        let subject = Uuid::new_v4();
        store.insert(record("contested", subject)).await.unwrap();

        let a = {
            let store = store.clone();
            tokio::spawn(async move { store.rotate("contested", record("a", subject)).await })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move { store.rotate("contested", record("b", subject)).await })
        };

        let outcomes = [a.await.unwrap().unwrap(), b.await.unwrap().unwrap()];
        let wins = outcomes
            .iter()
            .filter(|o| **o == RotateOutcome::Rotated)
            .count();
        let losses = outcomes
            .iter()
            .filter(|o| **o == RotateOutcome::NotActive)
            .count();

        assert_eq!(wins, 1);
        assert_eq!(losses, 1);
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let store = MemorySessionStore::new();
        let subject = Uuid::new_v4();
        store.insert(record("s1", subject)).await.unwrap();

        store.revoke("s1").await.unwrap();
        store.revoke("s1").await.unwrap();
        store.revoke("never-existed").await.unwrap();

        assert!(store.find("s1").await.unwrap().unwrap().revoked);
    }

    #[tokio::test]
    async fn revoke_all_spans_every_chain_of_the_subject() {
        let store = MemorySessionStore::new();
        let subject = Uuid::new_v4();
        let other = Uuid::new_v4();
        store.insert(record("device-1", subject)).await.unwrap();
        store.insert(record("device-2", subject)).await.unwrap();
        store.insert(record("other", other)).await.unwrap();

        store.revoke_all_for_subject(subject).await.unwrap();

        assert!(store.find("device-1").await.unwrap().unwrap().revoked);
        assert!(store.find("device-2").await.unwrap().unwrap().revoked);
        assert!(store.find("other").await.unwrap().unwrap().is_active());
    }

    #[test]
    fn expiry_is_inclusive_at_the_boundary() {
        let rec = RefreshRecord::new("t".to_string(), Uuid::new_v4(), 0);
        assert!(rec.is_expired(Utc::now()));
    }
}
