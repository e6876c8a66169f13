//! Persistence layer.
//!
//! SQLite via sqlx: pool rows carry the open/closed status, the
//! closure fingerprint and snapshot; generated wagers land one row
//! each. The status transition is the single-writer guard — a
//! conditional update that only succeeds while the pool is still open,
//! so a racing closer observes failure with nothing persisted.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::types::{BolaoError, ClosureRecord, PoolStatus};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS pools (
    id               TEXT PRIMARY KEY,
    name             TEXT NOT NULL,
    status           TEXT NOT NULL DEFAULT 'open',
    fingerprint      TEXT,
    closure_snapshot TEXT,
    closed_at        TEXT,
    closed_by        TEXT
);
CREATE TABLE IF NOT EXISTS wagers (
    id         TEXT PRIMARY KEY,
    pool_id    TEXT NOT NULL REFERENCES pools(id),
    wager_type TEXT NOT NULL,
    numbers    TEXT NOT NULL,
    cost       TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;

/// A persisted wager row, as read back for audit display.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredWager {
    pub id: String,
    pub pool_id: String,
    pub wager_type: String,
    pub numbers: Vec<u8>,
    pub cost: Decimal,
}

pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Connect to the given SQLite URL (`sqlite::memory:` in tests).
    pub async fn connect(url: &str) -> Result<Self, BolaoError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await?;
        debug!(url, "Storage connected");
        Ok(Self { pool })
    }

    /// Create tables if they don't exist yet.
    pub async fn migrate(&self) -> Result<(), BolaoError> {
        // raw_sql: the schema is two statements, prepared queries take one.
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Register a new pool in the open state.
    pub async fn create_pool(&self, id: &str, name: &str) -> Result<(), BolaoError> {
        sqlx::query("INSERT INTO pools (id, name, status) VALUES (?1, ?2, 'open')")
            .bind(id)
            .bind(name)
            .execute(&self.pool)
            .await?;
        info!(pool_id = id, name, "Pool created");
        Ok(())
    }

    /// Current status of a pool; `PoolNotFound` if it doesn't exist.
    pub async fn fetch_status(&self, id: &str) -> Result<PoolStatus, BolaoError> {
        let row = sqlx::query("SELECT status FROM pools WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let row = row.ok_or_else(|| BolaoError::PoolNotFound(id.to_string()))?;
        let status: String = row.get("status");
        status
            .parse()
            .map_err(|_| BolaoError::PoolNotFound(id.to_string()))
    }

    /// The stored fingerprint and closure snapshot, if the pool has
    /// been closed.
    pub async fn fetch_closure(
        &self,
        id: &str,
    ) -> Result<Option<(String, ClosureRecord)>, BolaoError> {
        let row = sqlx::query("SELECT fingerprint, closure_snapshot FROM pools WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| BolaoError::PoolNotFound(id.to_string()))?;

        let fingerprint: Option<String> = row.get("fingerprint");
        let snapshot: Option<String> = row.get("closure_snapshot");
        match (fingerprint, snapshot) {
            (Some(fingerprint), Some(snapshot)) => {
                let record: ClosureRecord = serde_json::from_str(&snapshot)?;
                Ok(Some((fingerprint, record)))
            }
            _ => Ok(None),
        }
    }

    /// Atomically transition a pool to closed and persist its closure.
    ///
    /// The status update is conditional on the row still being open at
    /// write time; `rows_affected == 0` means another closer won the
    /// race (or the pool vanished) and nothing is committed.
    pub async fn commit_closure(
        &self,
        id: &str,
        record: &ClosureRecord,
        fingerprint: &str,
    ) -> Result<(), BolaoError> {
        let snapshot = serde_json::to_string(record)?;
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE pools
             SET status = 'closed', fingerprint = ?1, closure_snapshot = ?2,
                 closed_at = ?3, closed_by = ?4
             WHERE id = ?5 AND status = 'open'",
        )
        .bind(fingerprint)
        .bind(&snapshot)
        .bind(record.generated_at.to_rfc3339())
        .bind(&record.closed_by)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            let status = self.fetch_status(id).await?;
            return Err(BolaoError::PoolNotOpen {
                id: id.to_string(),
                status,
            });
        }

        let created_at = record.generated_at.to_rfc3339();
        for wager in &record.wagers {
            sqlx::query(
                "INSERT INTO wagers (id, pool_id, wager_type, numbers, cost, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(id)
            .bind(wager.kind.to_string())
            .bind(serde_json::to_string(&wager.numbers)?)
            .bind(wager.cost.to_string())
            .bind(&created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!(
            pool_id = id,
            wagers = record.wagers.len(),
            fingerprint,
            "Closure committed"
        );
        Ok(())
    }

    /// All persisted wagers of a pool, insertion order.
    pub async fn list_wagers(&self, pool_id: &str) -> Result<Vec<StoredWager>, BolaoError> {
        let rows = sqlx::query(
            "SELECT id, pool_id, wager_type, numbers, cost FROM wagers
             WHERE pool_id = ?1 ORDER BY rowid",
        )
        .bind(pool_id)
        .fetch_all(&self.pool)
        .await?;

        let mut wagers = Vec::with_capacity(rows.len());
        for row in rows {
            let numbers: String = row.get("numbers");
            let cost: String = row.get("cost");
            wagers.push(StoredWager {
                id: row.get("id"),
                pool_id: row.get("pool_id"),
                wager_type: row.get("wager_type"),
                numbers: serde_json::from_str(&numbers)?,
                cost: cost.parse().unwrap_or(Decimal::ZERO),
            });
        }
        Ok(wagers)
    }

    /// When the pool was closed, if it was.
    pub async fn fetch_closed_at(&self, id: &str) -> Result<Option<DateTime<Utc>>, BolaoError> {
        let row = sqlx::query("SELECT closed_at FROM pools WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| BolaoError::PoolNotFound(id.to_string()))?;
        let closed_at: Option<String> = row.get("closed_at");
        Ok(closed_at
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        AllocationEntry, AllocationPlan, GeneratedWager, ParticipantSelection, WagerKind,
    };
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    async fn storage() -> Storage {
        let s = Storage::connect("sqlite::memory:").await.unwrap();
        s.migrate().await.unwrap();
        s
    }

    fn sample_record() -> ClosureRecord {
        ClosureRecord {
            allocation: AllocationPlan {
                entries: vec![AllocationEntry {
                    number_count: 6,
                    cost: dec!(6),
                    count: 2,
                }],
                total_cost: dec!(12),
                total_bets: 2,
                remaining_funds: dec!(1),
            },
            selections: vec![ParticipantSelection {
                participant_id: "p1".into(),
                name: "Ana".into(),
                numbers: vec![3, 17, 28, 35, 46, 59],
                auto_generated: false,
            }],
            number_voters: BTreeMap::from([(3, vec!["Ana".to_string()])]),
            wagers: vec![
                GeneratedWager {
                    label: "6 numbers #1".into(),
                    kind: WagerKind::Flagship,
                    numbers: vec![3, 17, 28, 35, 46, 59],
                    cost: dec!(6),
                },
                GeneratedWager {
                    label: "6 numbers #2".into(),
                    kind: WagerKind::Standard,
                    numbers: vec![5, 14, 23, 38, 44, 57],
                    cost: dec!(6),
                },
            ],
            generated_at: Utc::now(),
            closed_by: "admin".into(),
        }
    }

    #[tokio::test]
    async fn test_create_and_fetch_status() {
        let s = storage().await;
        s.create_pool("pool-1", "Friends").await.unwrap();
        assert_eq!(s.fetch_status("pool-1").await.unwrap(), PoolStatus::Open);
    }

    #[tokio::test]
    async fn test_unknown_pool_not_found() {
        let s = storage().await;
        let err = s.fetch_status("ghost").await.unwrap_err();
        assert!(matches!(err, BolaoError::PoolNotFound(_)));
    }

    #[tokio::test]
    async fn test_commit_closure_roundtrip() {
        let s = storage().await;
        s.create_pool("pool-1", "Friends").await.unwrap();

        let record = sample_record();
        s.commit_closure("pool-1", &record, "abc123").await.unwrap();

        assert_eq!(s.fetch_status("pool-1").await.unwrap(), PoolStatus::Closed);
        let (fingerprint, stored) = s.fetch_closure("pool-1").await.unwrap().unwrap();
        assert_eq!(fingerprint, "abc123");
        assert_eq!(stored.wagers, record.wagers);
        assert!(s.fetch_closed_at("pool-1").await.unwrap().is_some());

        let wagers = s.list_wagers("pool-1").await.unwrap();
        assert_eq!(wagers.len(), 2);
        assert_eq!(wagers[0].wager_type, "flagship");
        assert_eq!(wagers[0].numbers, vec![3, 17, 28, 35, 46, 59]);
        assert_eq!(wagers[1].cost, dec!(6));
    }

    #[tokio::test]
    async fn test_double_close_rejected_and_snapshot_untouched() {
        let s = storage().await;
        s.create_pool("pool-1", "Friends").await.unwrap();

        let first = sample_record();
        s.commit_closure("pool-1", &first, "first-fp").await.unwrap();

        let mut second = sample_record();
        second.closed_by = "intruder".into();
        let err = s.commit_closure("pool-1", &second, "second-fp").await.unwrap_err();
        assert!(matches!(err, BolaoError::PoolNotOpen { .. }));

        // The losing attempt must not have persisted anything.
        let (fingerprint, stored) = s.fetch_closure("pool-1").await.unwrap().unwrap();
        assert_eq!(fingerprint, "first-fp");
        assert_eq!(stored.closed_by, "admin");
        assert_eq!(s.list_wagers("pool-1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_open_pool_has_no_closure() {
        let s = storage().await;
        s.create_pool("pool-1", "Friends").await.unwrap();
        assert!(s.fetch_closure("pool-1").await.unwrap().is_none());
        assert!(s.fetch_closed_at("pool-1").await.unwrap().is_none());
    }
}
