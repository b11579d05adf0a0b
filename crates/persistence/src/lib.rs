//! Persistence layer for sessions, transcripts, and audit records
//!
//! The store is a relational service with row-level access control behind a
//! REST surface; the worker's service key bypasses RLS. Every write from
//! the core is fire-and-forget: a failed insert is logged and never reaches
//! the speech path.

pub mod records;
pub mod rest;
pub mod store;

use thiserror::Error;

pub use records::{
    EscalationEventRow, GuardrailEventRow, LearningSessionRow, RoutingDecisionRow,
    TranscriptTurnRow,
};
pub use rest::RestStore;
pub use store::{spawn_write, LearningStore, NullStore, StoreAuditSink};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("store request failed: {0}")]
    Request(String),
    #[error("store returned {status}: {detail}")]
    Status { status: u16, detail: String },
}
