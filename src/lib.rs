//! driftgate: drift detection and durability gating for the decision store.
//!
//! The decision store keeps its authoritative record in Postgres and a
//! derived search index in Qdrant, kept in sync by an asynchronous,
//! at-least-once outbox pipeline. This crate is the operational tooling
//! around that contract:
//!
//! - `driftgate reconcile` computes the set difference between the current
//!   Postgres decision ids and the Qdrant point ids, and (with `--repair`)
//!   enqueues idempotent upsert intents into `search_outbox` for anything
//!   missing from the index.
//! - `driftgate verify` runs the durability exit-criteria battery — orphan
//!   integrity, dead-letter threshold, outbox staleness, optional strict
//!   retention, optional drift reconciliation — and aggregates them into one
//!   pass/fail verdict.
//!
//! Both subcommands are short-lived, single-threaded batch jobs: one JSON
//! object on stdout, diagnostics on stderr, and an exit code of 0 (clean),
//! 1 (drift or a failed check), or 2 (could not run at all).
//!
//! The crate never writes to the index, never deletes outbox rows, and
//! never performs destructive deletes anywhere: the only mutation it makes
//! is the upsert-on-conflict repair enqueue.

pub mod cli;
pub mod core;
