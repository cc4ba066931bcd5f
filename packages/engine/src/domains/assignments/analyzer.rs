//! Pure classification of one AP user's assignment consistency state.
//!
//! The analyzer has no side effects: it takes the user's slice of store data
//! and derives the unified status from the invariants. Nothing here is
//! persisted; every read reclassifies from scratch, so whatever was last
//! durably written always lands in the right state on the next run.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::common::{ApUserId, LocationId};

use super::issues::{Issue, IssueKind};
use super::models::{ApUser, LocationAssignment, ProviderRecord};

/// Derived consistency state for one AP user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentState {
    /// Primary assignment and approved provider record agree on the location.
    Complete,
    /// Exactly one half of the assignment/provider pair exists, or the
    /// assignments lack a primary flag.
    Partial,
    /// The two sources of truth disagree; never auto-repaired.
    Conflict,
    /// Neither an active assignment nor an approved provider record exists.
    Missing,
}

/// The full derived status for one AP user.
///
/// Carries the primary assignment and provider record that classification
/// saw, so the repair path can pick its entry step without re-deriving them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedAssignmentStatus {
    pub ap_user_id: ApUserId,
    pub state: AssignmentState,
    pub issues: Vec<Issue>,
    pub recommendations: Vec<String>,
    pub primary_assignment: Option<LocationAssignment>,
    pub provider: Option<ProviderRecord>,
}

impl UnifiedAssignmentStatus {
    /// Whether the user carries a given issue kind.
    pub fn has_issue(&self, kind: IssueKind) -> bool {
        self.issues.iter().any(|i| i.kind == kind)
    }
}

/// Classify one AP user from its related entities.
///
/// `known_locations` is the set of location ids that currently resolve; it
/// drives the orphan-reference checks, which always run and append issues
/// without changing the primary classification.
pub fn analyze_assignment_status(
    user: &ApUser,
    assignments: &[LocationAssignment],
    provider: Option<&ProviderRecord>,
    known_locations: &HashSet<LocationId>,
) -> UnifiedAssignmentStatus {
    let mut issues = Vec::new();
    let mut recommendations = Vec::new();

    let active: Vec<&LocationAssignment> = assignments.iter().filter(|a| a.is_active()).collect();
    let primaries: Vec<&LocationAssignment> =
        active.iter().copied().filter(|a| a.is_primary).collect();

    // Orphan reference checks run unconditionally.
    for assignment in &active {
        if !known_locations.contains(&assignment.location_id) {
            issues.push(Issue::new(
                IssueKind::OrphanedLocationRef,
                format!(
                    "assignment {} for {} references location {} ({}) which no longer exists",
                    assignment.id, user.display_name, assignment.location_id, assignment.location_name
                ),
            ));
        }
    }
    if let Some(p) = provider {
        if !known_locations.contains(&p.primary_location_id) {
            issues.push(Issue::new(
                IssueKind::OrphanedLocationRef,
                format!(
                    "provider record {} for {} references location {} ({}) which no longer exists",
                    p.id, user.display_name, p.primary_location_id, p.primary_location_name
                ),
            ));
        }
    }

    let has_assignment = !active.is_empty();
    let approved_provider = provider.filter(|p| p.is_approved());

    // More than one primary flag is a conflict in its own right;
    // retiring one automatically would be an arbitrary choice.
    if primaries.len() > 1 {
        issues.push(Issue::new(
            IssueKind::MultiplePrimaryAssignments,
            format!(
                "{} has {} active assignments flagged primary; at most one is allowed",
                user.display_name,
                primaries.len()
            ),
        ));
        recommendations.push(format!(
            "Review {}'s primary assignments and retire all but one",
            user.display_name
        ));
        return UnifiedAssignmentStatus {
            ap_user_id: user.id,
            state: AssignmentState::Conflict,
            issues,
            recommendations,
            primary_assignment: None,
            provider: provider.cloned(),
        };
    }

    let primary = primaries.first().copied();

    let state = match (primary, approved_provider) {
        (Some(assignment), Some(p)) => {
            if assignment.location_id == p.primary_location_id {
                AssignmentState::Complete
            } else {
                // The two sources of truth disagree. Picking
                // either side could silently discard a deliberate manual
                // assignment, so this is reported and left alone.
                issues.push(Issue::new(
                    IssueKind::LocationMismatch,
                    format!(
                        "{}'s primary assignment points at location {} ({}) but the provider record points at location {} ({})",
                        user.display_name,
                        assignment.location_id,
                        assignment.location_name,
                        p.primary_location_id,
                        p.primary_location_name
                    ),
                ));
                recommendations.push(format!(
                    "Manually review {}'s assignment and provider record to decide the correct location",
                    user.display_name
                ));
                AssignmentState::Conflict
            }
        }
        (Some(_), None) => {
            let message = match provider {
                Some(_) => format!(
                    "{} has a primary assignment but the provider record is inactive",
                    user.display_name
                ),
                None => format!(
                    "{} has a primary assignment but no provider record",
                    user.display_name
                ),
            };
            issues.push(Issue::new(IssueKind::MissingProvider, message));
            AssignmentState::Partial
        }
        (None, Some(p)) => {
            if has_assignment {
                // Active assignments exist but none is flagged primary.
                issues.push(Issue::new(
                    IssueKind::MissingPrimaryFlag,
                    format!(
                        "{} has active assignments but none is flagged primary",
                        user.display_name
                    ),
                ));
                recommendations.push(format!(
                    "Designate one of {}'s active assignments as primary",
                    user.display_name
                ));
            } else {
                issues.push(Issue::new(
                    IssueKind::MissingAssignment,
                    format!(
                        "{} has a provider record at location {} ({}) but no active assignment",
                        user.display_name, p.primary_location_id, p.primary_location_name
                    ),
                ));
            }
            AssignmentState::Partial
        }
        (None, None) => {
            if has_assignment {
                issues.push(Issue::new(
                    IssueKind::MissingPrimaryFlag,
                    format!(
                        "{} has active assignments but none is flagged primary",
                        user.display_name
                    ),
                ));
                issues.push(Issue::new(
                    IssueKind::MissingProvider,
                    format!("{} has no provider record", user.display_name),
                ));
                recommendations.push(format!(
                    "Designate one of {}'s active assignments as primary",
                    user.display_name
                ));
                AssignmentState::Partial
            } else {
                issues.push(Issue::new(
                    IssueKind::MissingAssignment,
                    format!("{} has no active location assignment", user.display_name),
                ));
                issues.push(Issue::new(
                    IssueKind::MissingProvider,
                    format!("{} has no provider record", user.display_name),
                ));
                recommendations.push(format!(
                    "Assign {} to an available location",
                    user.display_name
                ));
                AssignmentState::Missing
            }
        }
    };

    UnifiedAssignmentStatus {
        ap_user_id: user.id,
        state,
        issues,
        recommendations,
        primary_assignment: primary.cloned(),
        provider: provider.cloned(),
    }
}
