//! Durability exit-criteria battery.
//!
//! A fixed, ordered sequence of independent checks aggregated into one
//! pass/fail verdict. A failed check is an expected, reportable outcome and
//! never stops the remaining checks — operators get the full picture in one
//! pass. An unexpected error while performing a check aborts the whole run:
//! an aborted run means the gate could not even form an opinion, which is a
//! different thing from a threshold being exceeded.

use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use crate::core::config::GateThresholds;
use crate::core::drift::run_reconciliation;
use crate::core::error::{DriftgateError, EXIT_DRIFT, EXIT_OK};
use crate::core::index::SearchIndex;
use crate::core::primary::{MAX_OUTBOX_ATTEMPTS, PrimaryStore};

/// Outcome of one check in the battery.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: &'static str,
    pub passed: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
    pub details: serde_json::Value,
}

impl CheckResult {
    fn ran(name: &'static str, passed: bool, details: serde_json::Value) -> Self {
        CheckResult {
            name,
            passed,
            skipped: false,
            details,
        }
    }

    /// A skipped check counts as passed and must not affect the verdict.
    fn skipped(name: &'static str, reason: &str) -> Self {
        CheckResult {
            name,
            passed: true,
            skipped: true,
            details: json!({ "reason": reason }),
        }
    }
}

/// The gate's machine-readable report, one JSON object on stdout.
#[derive(Debug, Clone, Serialize)]
pub struct GateReport {
    pub started_at_unix: i64,
    pub completed_at_unix: i64,
    pub all_passed: bool,
    pub checks: Vec<CheckResult>,
}

impl GateReport {
    pub fn exit_code(&self) -> i32 {
        if self.all_passed { EXIT_OK } else { EXIT_DRIFT }
    }
}

/// Logical AND over every check; skipped checks carry `passed: true` and so
/// cannot flip the verdict.
fn aggregate(checks: &[CheckResult]) -> bool {
    checks.iter().all(|c| c.passed)
}

/// Run the full battery in order and aggregate the verdict.
///
/// `index` is `None` when no Qdrant endpoint is configured; the drift check
/// is then skipped rather than failed.
pub async fn run_gate(
    primary: &dyn PrimaryStore,
    index: Option<&dyn SearchIndex>,
    thresholds: &GateThresholds,
) -> Result<GateReport, DriftgateError> {
    let started_at_unix = Utc::now().timestamp();
    let mut checks = Vec::with_capacity(5);

    let orphans = primary.orphan_counts().await?;
    checks.push(CheckResult::ran(
        "orphan_integrity",
        orphans.total() == 0,
        json!({
            "decisions_without_run": orphans.decisions_without_run,
            "alternatives_without_decision": orphans.alternatives_without_decision,
            "evidence_without_decision": orphans.evidence_without_decision,
        }),
    ));

    let dead_letters = primary.dead_letter_count(MAX_OUTBOX_ATTEMPTS).await?;
    checks.push(CheckResult::ran(
        "dead_letter_threshold",
        dead_letters <= thresholds.max_dead_letters,
        json!({
            "dead_letters": dead_letters,
            "max_allowed": thresholds.max_dead_letters,
        }),
    ));

    let oldest_seconds = primary.oldest_pending_seconds(MAX_OUTBOX_ATTEMPTS).await?;
    checks.push(CheckResult::ran(
        "outbox_oldest_age",
        oldest_seconds <= thresholds.max_outbox_oldest_seconds,
        json!({
            "oldest_pending_seconds": oldest_seconds,
            "max_allowed_seconds": thresholds.max_outbox_oldest_seconds,
        }),
    ));

    if thresholds.strict_retention {
        let old_events = primary
            .events_older_than_days(thresholds.retain_days)
            .await?;
        checks.push(CheckResult::ran(
            "strict_retention_window",
            old_events == 0,
            json!({
                "events_older_than_retain_days": old_events,
                "retain_days": thresholds.retain_days,
            }),
        ));
    } else {
        checks.push(CheckResult::skipped(
            "strict_retention_window",
            "STRICT_RETENTION_CHECK=false",
        ));
    }

    match index {
        Some(index) => checks.push(drift_check(primary, index).await),
        None => checks.push(CheckResult::skipped(
            "qdrant_reconciliation",
            "QDRANT_URL not set",
        )),
    }

    let all_passed = aggregate(&checks);
    Ok(GateReport {
        started_at_unix,
        completed_at_unix: Utc::now().timestamp(),
        all_passed,
        checks,
    })
}

/// In-process drift sub-check, repair off. A reconciler error here is a
/// failed check with the error preserved in `details`, not an aborted run:
/// the battery keeps going so the report stays complete.
async fn drift_check(primary: &dyn PrimaryStore, index: &dyn SearchIndex) -> CheckResult {
    match run_reconciliation(primary, index, None, false).await {
        Ok(outcome) => CheckResult::ran(
            "qdrant_reconciliation",
            !outcome.report.has_drift(),
            json!({
                "missing_in_qdrant": outcome.report.missing_in_qdrant,
                "extra_in_qdrant": outcome.report.extra_in_qdrant,
            }),
        ),
        Err(err) => {
            tracing::warn!(error = %err, "drift check failed to complete");
            CheckResult::ran(
                "qdrant_reconciliation",
                false,
                json!({ "error": err.to_string() }),
            )
        }
    }
}
