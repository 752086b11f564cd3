//! Read-mostly accessor over the authoritative Postgres store.
//!
//! The only table this crate ever writes is `search_outbox`, and only via
//! upsert-on-conflict keyed by `(decision_id, operation)`. Rows are removed
//! exclusively by the outbox consumer; nothing here deletes anything.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::QueryBuilder;
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

use crate::core::error::DriftgateError;

/// Outbox attempts ceiling. An entry at or above this many attempts is a
/// dead letter: still present, but excluded from pending-staleness math.
/// Must match the partial index predicate in the outbox migration
/// (`WHERE attempts < 10`); changing it requires a new migration.
pub const MAX_OUTBOX_ATTEMPTS: i32 = 10;

/// One repair intent destined for the outbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairTarget {
    pub decision_id: Uuid,
    pub org_id: Uuid,
}

/// Per-relationship orphan counts across every parent→child edge in the
/// schema. Any nonzero count is a correctness bug in the write path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrphanCounts {
    pub decisions_without_run: i64,
    pub alternatives_without_decision: i64,
    pub evidence_without_decision: i64,
}

impl OrphanCounts {
    pub fn total(&self) -> i64 {
        self.decisions_without_run + self.alternatives_without_decision + self.evidence_without_decision
    }
}

/// Seam over the authoritative store. The gate and reconciler only ever see
/// this trait; production wires in [`PgPrimaryStore`], tests wire in fakes.
#[async_trait]
pub trait PrimaryStore: Send + Sync {
    /// Ids of all current, derivable decisions (id → org), optionally
    /// restricted to one org. Read-committed at call time; errors abort the
    /// caller rather than returning partial results.
    async fn current_decisions(
        &self,
        org: Option<Uuid>,
    ) -> Result<BTreeMap<Uuid, Uuid>, DriftgateError>;

    /// Enqueue (or refresh) upsert repair intents. A conflict on
    /// `(decision_id, operation)` resets `created_at`, zeroes `attempts`,
    /// and clears `locked_until` so a stalled repair is retried promptly.
    /// Returns the number of rows written.
    async fn enqueue_repairs(&self, targets: &[RepairTarget]) -> Result<u64, DriftgateError>;

    async fn orphan_counts(&self) -> Result<OrphanCounts, DriftgateError>;

    /// Outbox entries with `attempts >= ceiling`.
    async fn dead_letter_count(&self, ceiling: i32) -> Result<i64, DriftgateError>;

    /// Age in seconds of the oldest live (non-dead-letter) pending entry;
    /// 0 when the outbox has no live entries.
    async fn oldest_pending_seconds(&self, ceiling: i32) -> Result<i64, DriftgateError>;

    /// Append-only `agent_events` rows older than the retention horizon.
    async fn events_older_than_days(&self, days: i32) -> Result<i64, DriftgateError>;
}

/// Postgres-backed [`PrimaryStore`]. All SQL is runtime-checked
/// (`sqlx::query_as`, not the compile-time macros) so the crate builds
/// without a live database.
pub struct PgPrimaryStore {
    pool: PgPool,
}

impl PgPrimaryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with a bounded acquire timeout; a reconciliation run must
    /// fail fast rather than hang behind an unreachable database.
    pub async fn connect(database_url: &str) -> Result<Self, DriftgateError> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(15))
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl PrimaryStore for PgPrimaryStore {
    async fn current_decisions(
        &self,
        org: Option<Uuid>,
    ) -> Result<BTreeMap<Uuid, Uuid>, DriftgateError> {
        let rows = sqlx::query_as::<_, (Uuid, Uuid)>(
            r#"
            SELECT id, org_id
            FROM decisions
            WHERE valid_to IS NULL
              AND embedding IS NOT NULL
              AND ($1::uuid IS NULL OR org_id = $1)
            "#,
        )
        .bind(org)
        .fetch_all(&self.pool)
        .await?;
        tracing::debug!(count = rows.len(), "fetched current decisions");
        Ok(rows.into_iter().collect())
    }

    async fn enqueue_repairs(&self, targets: &[RepairTarget]) -> Result<u64, DriftgateError> {
        if targets.is_empty() {
            return Ok(0);
        }
        let mut builder: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new("INSERT INTO search_outbox (decision_id, org_id, operation) ");
        builder.push_values(targets, |mut row, t| {
            row.push_bind(t.decision_id)
                .push_bind(t.org_id)
                .push_bind("upsert");
        });
        builder.push(
            r#"
            ON CONFLICT (decision_id, operation) DO UPDATE
              SET created_at = now(), attempts = 0, locked_until = NULL
            "#,
        );
        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn orphan_counts(&self) -> Result<OrphanCounts, DriftgateError> {
        let (d, a, e) = sqlx::query_as::<_, (i64, i64, i64)>(
            r#"
            SELECT
              (SELECT count(*) FROM decisions d
                 LEFT JOIN agent_runs r ON r.id = d.run_id
                 WHERE r.id IS NULL),
              (SELECT count(*) FROM alternatives a
                 LEFT JOIN decisions d ON d.id = a.decision_id
                 WHERE d.id IS NULL),
              (SELECT count(*) FROM evidence e
                 LEFT JOIN decisions d ON d.id = e.decision_id
                 WHERE d.id IS NULL)
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(OrphanCounts {
            decisions_without_run: d,
            alternatives_without_decision: a,
            evidence_without_decision: e,
        })
    }

    async fn dead_letter_count(&self, ceiling: i32) -> Result<i64, DriftgateError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT count(*) FROM search_outbox WHERE attempts >= $1",
        )
        .bind(ceiling)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn oldest_pending_seconds(&self, ceiling: i32) -> Result<i64, DriftgateError> {
        let age = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COALESCE(EXTRACT(EPOCH FROM (now() - min(created_at)))::bigint, 0)
            FROM search_outbox
            WHERE attempts < $1
            "#,
        )
        .bind(ceiling)
        .fetch_one(&self.pool)
        .await?;
        Ok(age)
    }

    async fn events_older_than_days(&self, days: i32) -> Result<i64, DriftgateError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT count(*)
            FROM agent_events
            WHERE occurred_at < now() - make_interval(days => $1)
            "#,
        )
        .bind(days)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
