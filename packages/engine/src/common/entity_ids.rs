//! Typed ID definitions for all domain entities.
//!
//! This module defines type aliases for each domain entity, providing
//! compile-time type safety for ID usage throughout the engine.

// Re-export the core Id type
pub use super::id::Id;

// ============================================================================
// Entity marker types
// ============================================================================

/// Marker type for AP user entities (authorized-provider users).
pub struct ApUser;

/// Marker type for Location entities.
pub struct Location;

/// Marker type for LocationAssignment entities.
pub struct LocationAssignment;

/// Marker type for ProviderRecord entities.
pub struct ProviderRecord;

/// Marker type for Team entities.
pub struct Team;

// ============================================================================
// Type aliases - the primary API
// ============================================================================

/// Typed ID for AP user entities.
pub type ApUserId = Id<ApUser>;

/// Typed ID for Location entities.
pub type LocationId = Id<Location>;

/// Typed ID for LocationAssignment entities.
pub type AssignmentId = Id<LocationAssignment>;

/// Typed ID for ProviderRecord entities.
pub type ProviderRecordId = Id<ProviderRecord>;

/// Typed ID for Team entities.
pub type TeamId = Id<Team>;
