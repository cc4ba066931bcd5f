//! Reconciliation: idempotent, concurrency-safe repair of assignment drift.
//!
//! The engine classifies every AP user, repairs the fixable states through
//! the per-user saga, then links providerless teams to providers at their
//! locations. Per-entity failures are isolated; one bad entity never aborts
//! a batch.

pub mod engine;
pub mod saga;
pub mod strategy;

pub use engine::{
    EngineSettings, EntityError, ReconcileOptions, ReconcileResult, ReconciliationEngine,
};
pub use saga::{RepairOutcome, RepairSaga, RepairStep};
pub use strategy::{FirstAvailable, LocationSelectionStrategy};

use thiserror::Error;

use crate::kernel::StoreError;

/// Why a single entity's repair did not happen.
#[derive(Debug, Error)]
pub enum FixError {
    /// Two sources of truth disagree; resolving automatically could
    /// discard a deliberate manual assignment.
    #[error("conflicting assignment data requires manual review: {0}")]
    Conflict(String),

    /// A reference points at a record that no longer exists; only an
    /// administrator may clean this up.
    #[error("orphaned reference requires administrator cleanup: {0}")]
    OrphanReference(String),

    /// No open location exists for an unassigned user.
    #[error("no available location to assign")]
    NoCandidateLocation,

    /// The store failed mid-repair; the entity is retried on the next run.
    #[error(transparent)]
    Store(#[from] StoreError),
}
