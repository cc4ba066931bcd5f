//! Closed taxonomy of consistency issues.
//!
//! Severity and auto-fixability are data lookups on `IssueKind`, never
//! derived from message text. The rendered message is for humans; the kind
//! is what the report generator and the repair path act on.

use serde::{Deserialize, Serialize};

/// How urgently an issue needs attention.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
}

/// Every consistency issue the engine can detect.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// AP user has no active location assignment.
    MissingAssignment,
    /// AP user has active assignments but none is flagged primary.
    MissingPrimaryFlag,
    /// AP user has no approved provider record.
    MissingProvider,
    /// Primary assignment and provider record point at different locations.
    LocationMismatch,
    /// More than one active assignment is flagged primary.
    MultiplePrimaryAssignments,
    /// An assignment or provider record references a location that no longer exists.
    OrphanedLocationRef,
    /// A team references a provider record that no longer exists.
    OrphanedProviderRef,
    /// An active team has no location.
    TeamMissingLocation,
    /// A team with members has no managing provider.
    TeamMissingProvider,
    /// An inactive team still has active members.
    InactiveTeamWithMembers,
    /// The entity store could not be read for this entity.
    StoreUnavailable,
}

impl IssueKind {
    /// Severity lookup table.
    ///
    /// Conflicts and orphaned references are critical: both mean two sources
    /// of truth disagree and an automated write could destroy deliberate
    /// manual data.
    pub fn severity(self) -> Severity {
        match self {
            IssueKind::LocationMismatch
            | IssueKind::MultiplePrimaryAssignments
            | IssueKind::OrphanedLocationRef
            | IssueKind::OrphanedProviderRef
            | IssueKind::StoreUnavailable => Severity::Critical,
            IssueKind::MissingAssignment
            | IssueKind::MissingPrimaryFlag
            | IssueKind::MissingProvider
            | IssueKind::TeamMissingLocation
            | IssueKind::TeamMissingProvider
            | IssueKind::InactiveTeamWithMembers => Severity::Warning,
        }
    }

    /// Whether the reconciliation engine is allowed to repair this issue
    /// without a human in the loop.
    pub fn auto_fixable(self) -> bool {
        match self {
            IssueKind::MissingAssignment
            | IssueKind::MissingProvider
            | IssueKind::TeamMissingProvider => true,
            // Conflicts must never be resolved by picking a side; orphans
            // require administrator cleanup; promoting one of several
            // non-primary assignments would be an arbitrary choice.
            IssueKind::MissingPrimaryFlag
            | IssueKind::LocationMismatch
            | IssueKind::MultiplePrimaryAssignments
            | IssueKind::OrphanedLocationRef
            | IssueKind::OrphanedProviderRef
            | IssueKind::TeamMissingLocation
            | IssueKind::InactiveTeamWithMembers
            | IssueKind::StoreUnavailable => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IssueKind::MissingAssignment => "missing_assignment",
            IssueKind::MissingPrimaryFlag => "missing_primary_flag",
            IssueKind::MissingProvider => "missing_provider",
            IssueKind::LocationMismatch => "location_mismatch",
            IssueKind::MultiplePrimaryAssignments => "multiple_primary_assignments",
            IssueKind::OrphanedLocationRef => "orphaned_location_ref",
            IssueKind::OrphanedProviderRef => "orphaned_provider_ref",
            IssueKind::TeamMissingLocation => "team_missing_location",
            IssueKind::TeamMissingProvider => "team_missing_provider",
            IssueKind::InactiveTeamWithMembers => "inactive_team_with_members",
            IssueKind::StoreUnavailable => "store_unavailable",
        }
    }
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected issue: the machine-readable kind plus a message naming the
/// concrete entities involved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Issue {
    pub kind: IssueKind,
    pub message: String,
}

impl Issue {
    pub fn new(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflicts_are_critical_and_not_fixable() {
        for kind in [
            IssueKind::LocationMismatch,
            IssueKind::MultiplePrimaryAssignments,
        ] {
            assert_eq!(kind.severity(), Severity::Critical);
            assert!(!kind.auto_fixable());
        }
    }

    #[test]
    fn test_orphans_are_critical_and_not_fixable() {
        for kind in [IssueKind::OrphanedLocationRef, IssueKind::OrphanedProviderRef] {
            assert_eq!(kind.severity(), Severity::Critical);
            assert!(!kind.auto_fixable());
        }
    }

    #[test]
    fn test_missing_halves_are_fixable_warnings() {
        for kind in [
            IssueKind::MissingAssignment,
            IssueKind::MissingProvider,
            IssueKind::TeamMissingProvider,
        ] {
            assert_eq!(kind.severity(), Severity::Warning);
            assert!(kind.auto_fixable());
        }
    }

    #[test]
    fn test_primary_flag_promotion_is_never_automatic() {
        assert!(!IssueKind::MissingPrimaryFlag.auto_fixable());
    }

    #[test]
    fn test_display_matches_serde_name() {
        let json = serde_json::to_string(&IssueKind::LocationMismatch).unwrap();
        assert_eq!(json, format!("\"{}\"", IssueKind::LocationMismatch));
    }
}
