//! In-memory fakes for both store seams.
//!
//! The fakes mirror the storage-layer semantics the real adapters rely on:
//! the outbox is keyed by `(decision_id, operation)` so a re-enqueue updates
//! the existing row, and dead letters (attempts at the ceiling) are excluded
//! from pending-staleness math.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use driftgate::core::error::DriftgateError;
use driftgate::core::index::{PointIds, SearchIndex};
use driftgate::core::primary::{OrphanCounts, PrimaryStore, RepairTarget};

#[derive(Debug, Clone)]
pub struct OutboxRow {
    pub org_id: Uuid,
    pub attempts: i32,
    pub locked: bool,
    pub age_seconds: i64,
}

#[derive(Default)]
struct PrimaryState {
    decisions: BTreeMap<Uuid, Uuid>,
    outbox: BTreeMap<(Uuid, &'static str), OutboxRow>,
    orphans: OrphanCounts,
    old_events: i64,
    enqueue_batch_sizes: Vec<usize>,
    fail: bool,
}

/// Fake authoritative store.
#[derive(Default)]
pub struct MemoryPrimary {
    state: Mutex<PrimaryState>,
}

impl MemoryPrimary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_decisions(decisions: &[(Uuid, Uuid)]) -> Self {
        let store = Self::new();
        for (id, org) in decisions {
            store.add_decision(*id, *org);
        }
        store
    }

    pub fn add_decision(&self, id: Uuid, org: Uuid) {
        self.state.lock().unwrap().decisions.insert(id, org);
    }

    pub fn seed_outbox(&self, id: Uuid, row: OutboxRow) {
        self.state.lock().unwrap().outbox.insert((id, "upsert"), row);
    }

    pub fn set_orphans(&self, orphans: OrphanCounts) {
        self.state.lock().unwrap().orphans = orphans;
    }

    pub fn set_old_events(&self, count: i64) {
        self.state.lock().unwrap().old_events = count;
    }

    /// Make every subsequent call fail like a lost connection.
    pub fn fail_connections(&self) {
        self.state.lock().unwrap().fail = true;
    }

    pub fn outbox_rows(&self) -> Vec<(Uuid, OutboxRow)> {
        self.state
            .lock()
            .unwrap()
            .outbox
            .iter()
            .map(|((id, _), row)| (*id, row.clone()))
            .collect()
    }

    pub fn enqueue_batch_sizes(&self) -> Vec<usize> {
        self.state.lock().unwrap().enqueue_batch_sizes.clone()
    }

    /// Simulate the consumer succeeding on one entry: the index gains the
    /// point and the consumer removes the outbox row.
    pub fn consume_repair(&self, id: Uuid, index: &MemoryIndex) {
        let mut state = self.state.lock().unwrap();
        if let Some(row) = state.outbox.remove(&(id, "upsert")) {
            index.add_point(id, row.org_id);
        }
    }

    fn check_up(state: &PrimaryState) -> Result<(), DriftgateError> {
        if state.fail {
            Err(DriftgateError::Postgres(sqlx::Error::PoolTimedOut))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PrimaryStore for MemoryPrimary {
    async fn current_decisions(
        &self,
        org: Option<Uuid>,
    ) -> Result<BTreeMap<Uuid, Uuid>, DriftgateError> {
        let state = self.state.lock().unwrap();
        Self::check_up(&state)?;
        Ok(state
            .decisions
            .iter()
            .filter(|(_, o)| org.is_none_or(|want| **o == want))
            .map(|(id, o)| (*id, *o))
            .collect())
    }

    async fn enqueue_repairs(&self, targets: &[RepairTarget]) -> Result<u64, DriftgateError> {
        let mut state = self.state.lock().unwrap();
        Self::check_up(&state)?;
        state.enqueue_batch_sizes.push(targets.len());
        for target in targets {
            state.outbox.insert(
                (target.decision_id, "upsert"),
                OutboxRow {
                    org_id: target.org_id,
                    attempts: 0,
                    locked: false,
                    age_seconds: 0,
                },
            );
        }
        Ok(targets.len() as u64)
    }

    async fn orphan_counts(&self) -> Result<OrphanCounts, DriftgateError> {
        let state = self.state.lock().unwrap();
        Self::check_up(&state)?;
        Ok(state.orphans)
    }

    async fn dead_letter_count(&self, ceiling: i32) -> Result<i64, DriftgateError> {
        let state = self.state.lock().unwrap();
        Self::check_up(&state)?;
        Ok(state
            .outbox
            .values()
            .filter(|row| row.attempts >= ceiling)
            .count() as i64)
    }

    async fn oldest_pending_seconds(&self, ceiling: i32) -> Result<i64, DriftgateError> {
        let state = self.state.lock().unwrap();
        Self::check_up(&state)?;
        Ok(state
            .outbox
            .values()
            .filter(|row| row.attempts < ceiling)
            .map(|row| row.age_seconds)
            .max()
            .unwrap_or(0))
    }

    async fn events_older_than_days(&self, _days: i32) -> Result<i64, DriftgateError> {
        let state = self.state.lock().unwrap();
        Self::check_up(&state)?;
        Ok(state.old_events)
    }
}

#[derive(Default)]
struct IndexState {
    points: BTreeMap<Uuid, Uuid>,
    foreign: Vec<String>,
    fail: bool,
}

/// Fake derived index; points carry an org tag for scoped enumeration.
#[derive(Default)]
pub struct MemoryIndex {
    state: Mutex<IndexState>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_points(points: &[(Uuid, Uuid)]) -> Self {
        let index = Self::new();
        for (id, org) in points {
            index.add_point(*id, *org);
        }
        index
    }

    pub fn add_point(&self, id: Uuid, org: Uuid) {
        self.state.lock().unwrap().points.insert(id, org);
    }

    /// Insert a point whose id is not a decision uuid.
    pub fn add_foreign_point(&self, id: &str) {
        self.state.lock().unwrap().foreign.push(id.to_string());
    }

    pub fn point_ids(&self) -> BTreeSet<Uuid> {
        self.state.lock().unwrap().points.keys().copied().collect()
    }

    /// Make every subsequent enumeration fail mid-flight.
    pub fn fail_enumeration(&self) {
        self.state.lock().unwrap().fail = true;
    }
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    async fn collect_point_ids(&self, org: Option<Uuid>) -> Result<PointIds, DriftgateError> {
        let state = self.state.lock().unwrap();
        if state.fail {
            return Err(DriftgateError::QdrantStatus {
                status: 503,
                body: "scroll interrupted".to_string(),
            });
        }
        Ok(PointIds {
            decisions: state
                .points
                .iter()
                .filter(|(_, o)| org.is_none_or(|want| **o == want))
                .map(|(id, _)| *id)
                .collect(),
            foreign: state.foreign.clone(),
        })
    }
}

pub fn uuid(n: u128) -> Uuid {
    Uuid::from_u128(n)
}
