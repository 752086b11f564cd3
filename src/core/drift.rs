//! Drift detection between the primary store and the derived index, plus
//! the outbox-mediated repair enqueue.
//!
//! Drift is a best-effort snapshot, not a linearizable comparison: the
//! consumer may add or remove points mid-enumeration, so a single report
//! can carry a small rate of transient false positives under active
//! traffic. Callers re-run before treating one report as conclusive.

use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

use crate::core::error::{DriftgateError, EXIT_DRIFT, EXIT_OK};
use crate::core::index::{PointIds, SearchIndex};
use crate::core::primary::{PrimaryStore, RepairTarget};

/// Upper bound on ids per outbox insert, keeping any single write bounded.
pub const REPAIR_BATCH_SIZE: usize = 500;

/// Machine-readable reconciliation report, one JSON object on stdout.
#[derive(Debug, Clone, Serialize)]
pub struct DriftReport {
    pub postgres_current_count: usize,
    pub qdrant_count: usize,
    pub missing_in_qdrant: usize,
    pub extra_in_qdrant: usize,
    pub org_scope: Option<Uuid>,
    #[serde(skip)]
    pub missing: Vec<Uuid>,
    #[serde(skip)]
    pub extra: Vec<Uuid>,
}

impl DriftReport {
    pub fn has_drift(&self) -> bool {
        self.missing_in_qdrant > 0 || self.extra_in_qdrant > 0
    }
}

/// Pure set difference between the two id sets. `missing` needs repair;
/// `extra` is only ever flagged — deleting index points is a destructive,
/// policy-sensitive action this crate never takes. Foreign index ids can
/// never match a decision, so each one counts as an extra point. Output is
/// sorted for reproducible reporting.
pub fn detect_drift(
    primary: &BTreeMap<Uuid, Uuid>,
    index: &PointIds,
    org: Option<Uuid>,
) -> DriftReport {
    let missing: Vec<Uuid> = primary
        .keys()
        .filter(|id| !index.decisions.contains(*id))
        .copied()
        .collect();
    let extra: Vec<Uuid> = index
        .decisions
        .iter()
        .filter(|id| !primary.contains_key(*id))
        .copied()
        .collect();
    DriftReport {
        postgres_current_count: primary.len(),
        qdrant_count: index.decisions.len() + index.foreign.len(),
        missing_in_qdrant: missing.len(),
        extra_in_qdrant: extra.len() + index.foreign.len(),
        org_scope: org,
        missing,
        extra,
    }
}

/// Enqueue upsert repairs for every missing id, in bounded batches.
/// Returns the number of entries enqueued or refreshed.
pub async fn enqueue_missing(
    store: &dyn PrimaryStore,
    missing: &[Uuid],
    orgs: &BTreeMap<Uuid, Uuid>,
) -> Result<u64, DriftgateError> {
    let targets: Vec<RepairTarget> = missing
        .iter()
        .filter_map(|id| {
            orgs.get(id).map(|org| RepairTarget {
                decision_id: *id,
                org_id: *org,
            })
        })
        .collect();

    let mut queued = 0u64;
    for batch in targets.chunks(REPAIR_BATCH_SIZE) {
        queued += store.enqueue_repairs(batch).await?;
    }
    Ok(queued)
}

/// Result of one reconciliation run.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub report: DriftReport,
    /// `Some(n)` iff repairs were requested and `n` entries were enqueued.
    pub queued_repairs: Option<u64>,
}

impl ReconcileOutcome {
    /// Exit 0 when nothing is left unresolved. Enqueueing repairs settles
    /// `missing` for this run (convergence is the consumer's job), so only
    /// unrepaired `missing` or any `extra` is non-zero drift.
    pub fn exit_code(&self) -> i32 {
        let unrepaired_missing =
            self.report.missing_in_qdrant > 0 && self.queued_repairs.is_none();
        if unrepaired_missing || self.report.extra_in_qdrant > 0 {
            EXIT_DRIFT
        } else {
            EXIT_OK
        }
    }
}

/// Compare the two stores and, when asked, enqueue repairs for the ids
/// missing from the index.
pub async fn run_reconciliation(
    primary: &dyn PrimaryStore,
    index: &dyn SearchIndex,
    org: Option<Uuid>,
    repair: bool,
) -> Result<ReconcileOutcome, DriftgateError> {
    let current = primary.current_decisions(org).await?;
    let points = index.collect_point_ids(org).await?;
    let report = detect_drift(&current, &points, org);

    tracing::info!(
        missing = report.missing_in_qdrant,
        extra = report.extra_in_qdrant,
        "reconciliation computed"
    );

    let queued_repairs = if repair && !report.missing.is_empty() {
        Some(enqueue_missing(primary, &report.missing, &current).await?)
    } else {
        None
    };

    Ok(ReconcileOutcome {
        report,
        queued_repairs,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn uuid(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    fn primary_of(ids: &[u128]) -> BTreeMap<Uuid, Uuid> {
        let org = uuid(0xfeed);
        ids.iter().map(|n| (uuid(*n), org)).collect()
    }

    fn index_of(ids: &[u128]) -> PointIds {
        PointIds {
            decisions: ids.iter().map(|n| uuid(*n)).collect(),
            foreign: Vec::new(),
        }
    }

    #[test]
    fn missing_and_extra_are_set_differences() {
        let p = primary_of(&[1, 2, 3]);
        let i = index_of(&[2, 3, 4]);
        let report = detect_drift(&p, &i, None);
        assert_eq!(report.missing, vec![uuid(1)]);
        assert_eq!(report.extra, vec![uuid(4)]);
        assert_eq!(report.postgres_current_count, 3);
        assert_eq!(report.qdrant_count, 3);
        assert!(report.has_drift());
    }

    #[test]
    fn missing_extra_and_intersection_are_disjoint() {
        let p = primary_of(&[1, 2, 3, 5, 8]);
        let i = index_of(&[2, 3, 4, 8, 9]);
        let report = detect_drift(&p, &i, None);
        let missing: BTreeSet<_> = report.missing.iter().collect();
        let extra: BTreeSet<_> = report.extra.iter().collect();
        assert!(missing.is_disjoint(&extra));
        for id in p.keys().filter(|id| i.decisions.contains(id)) {
            assert!(!missing.contains(id));
            assert!(!extra.contains(id));
        }
    }

    #[test]
    fn identical_sets_report_no_drift() {
        let p = primary_of(&[10, 11]);
        let i = index_of(&[10, 11]);
        let report = detect_drift(&p, &i, None);
        assert!(!report.has_drift());
        assert!(report.missing.is_empty());
        assert!(report.extra.is_empty());
    }

    #[test]
    fn foreign_index_ids_count_as_extra() {
        let p = primary_of(&[1]);
        let i = PointIds {
            decisions: [uuid(1)].into_iter().collect(),
            foreign: vec!["legacy-7".to_string(), "42".to_string()],
        };
        let report = detect_drift(&p, &i, None);
        assert_eq!(report.qdrant_count, 3);
        assert_eq!(report.missing_in_qdrant, 0);
        assert_eq!(report.extra_in_qdrant, 2);
        assert!(report.has_drift());
    }

    #[test]
    fn missing_list_is_sorted() {
        let p = primary_of(&[9, 1, 5, 3]);
        let i = index_of(&[]);
        let report = detect_drift(&p, &i, None);
        let mut sorted = report.missing.clone();
        sorted.sort();
        assert_eq!(report.missing, sorted);
    }

    #[test]
    fn report_serializes_counts_not_id_lists() {
        let p = primary_of(&[1]);
        let i = index_of(&[2]);
        let report = detect_drift(&p, &i, None);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["missing_in_qdrant"], 1);
        assert_eq!(value["extra_in_qdrant"], 1);
        assert!(value.get("missing").is_none());
        assert!(value.get("extra").is_none());
    }
}
