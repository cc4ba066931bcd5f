// Store contract the engine consumes
//
// This is an INFRASTRUCTURE trait only - no business logic. Classification
// and repair decisions live in the domain layer; implementations of this
// trait only move entities in and out of storage.
//
// Naming convention: Base* for trait names (e.g., BaseEntityStore)

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::common::{ApUserId, LocationId, ProviderRecordId, TeamId};
use crate::domains::assignments::models::{
    ApUser, AssignmentRole, Location, LocationAssignment, ProviderRecord,
};
use crate::domains::teams::models::Team;

/// Failures surfaced by an entity store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A compare-and-set write lost the race: the record it would have
    /// created already exists. Callers treat this as "already fixed".
    #[error("record already exists: {0}")]
    AlreadyExists(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("entity store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid stored value: {0}")]
    Decode(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Whether this error means another writer already performed the write.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists(_))
    }
}

/// Narrow contract between the engine and the platform's persistence layer.
///
/// Every mutation is a single-record compare-and-set: creation fails with
/// [`StoreError::AlreadyExists`] when a conflicting record is present, so
/// overlapping reconciliation runs cannot produce duplicates.
#[async_trait]
pub trait BaseEntityStore: Send + Sync {
    async fn list_ap_users(&self) -> Result<Vec<ApUser>, StoreError>;

    async fn get_ap_user(&self, ap_user_id: ApUserId) -> Result<Option<ApUser>, StoreError>;

    async fn get_assignments(
        &self,
        ap_user_id: ApUserId,
    ) -> Result<Vec<LocationAssignment>, StoreError>;

    async fn get_provider_record(
        &self,
        ap_user_id: ApUserId,
    ) -> Result<Option<ProviderRecord>, StoreError>;

    async fn get_provider_record_by_id(
        &self,
        provider_id: ProviderRecordId,
    ) -> Result<Option<ProviderRecord>, StoreError>;

    /// All locations, for reference resolution.
    async fn list_locations(&self) -> Result<Vec<Location>, StoreError>;

    /// Locations with zero active primary assignments.
    async fn list_available_locations(&self) -> Result<Vec<Location>, StoreError>;

    /// Create a location assignment.
    ///
    /// Fails with [`StoreError::AlreadyExists`] when `is_primary` is set and
    /// the user already has an active primary assignment.
    async fn create_assignment(
        &self,
        ap_user_id: ApUserId,
        location_id: LocationId,
        is_primary: bool,
        role: AssignmentRole,
    ) -> Result<LocationAssignment, StoreError>;

    /// Create a provider record for a user that has none.
    ///
    /// Fails with [`StoreError::AlreadyExists`] when any record (approved or
    /// inactive) already exists for the user.
    async fn create_provider_record(
        &self,
        ap_user_id: ApUserId,
        primary_location_id: LocationId,
    ) -> Result<ProviderRecord, StoreError>;

    async fn list_teams(&self, location_id: Option<LocationId>) -> Result<Vec<Team>, StoreError>;

    /// Link a team to its managing provider.
    ///
    /// Fails with [`StoreError::AlreadyExists`] when the team is already
    /// linked to a provider.
    async fn set_team_provider(
        &self,
        team_id: TeamId,
        provider_id: ProviderRecordId,
    ) -> Result<(), StoreError>;
}
