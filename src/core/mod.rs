//! Core reconciliation and gating modules.
//!
//! Everything here shares one mental model: the outbox-mediated eventual
//! consistency contract between the authoritative Postgres store and the
//! derived Qdrant index.

pub mod config;
pub mod drift;
pub mod error;
pub mod gate;
pub mod index;
pub mod primary;
