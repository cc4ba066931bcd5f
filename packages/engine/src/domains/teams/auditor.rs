//! Pure classification of one team's provider/location consistency.

use serde::{Deserialize, Serialize};

use crate::common::TeamId;
use crate::domains::assignments::issues::{Issue, IssueKind};
use crate::domains::assignments::models::{Location, ProviderRecord};

use super::models::Team;

/// Audit result for one team.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamAudit {
    pub team_id: TeamId,
    pub has_provider: bool,
    pub has_location: bool,
    pub provider_valid: bool,
    pub issues: Vec<Issue>,
}

impl TeamAudit {
    pub fn has_issue(&self, kind: IssueKind) -> bool {
        self.issues.iter().any(|i| i.kind == kind)
    }
}

/// Audit one team against its resolved location and provider record.
///
/// The caller resolves the references; passing `None` for a reference the
/// team actually holds means the referenced record does not exist.
pub fn audit_team(
    team: &Team,
    location: Option<&Location>,
    provider: Option<&ProviderRecord>,
) -> TeamAudit {
    let mut issues = Vec::new();

    let has_location = match (team.location_id, location) {
        (Some(_), Some(_)) => true,
        (Some(location_id), None) => {
            issues.push(Issue::new(
                IssueKind::OrphanedLocationRef,
                format!(
                    "team {} ({}) references location {} which no longer exists",
                    team.name, team.id, location_id
                ),
            ));
            false
        }
        (None, _) => {
            if team.is_active() {
                issues.push(Issue::new(
                    IssueKind::TeamMissingLocation,
                    format!("active team {} ({}) has no location", team.name, team.id),
                ));
            }
            false
        }
    };

    let has_provider = team.provider_id.is_some();
    let provider_valid = match (team.provider_id, provider) {
        (Some(_), Some(p)) => {
            // The managing provider's primary location must be the
            // team's own location.
            match team.location_id {
                Some(location_id) if p.primary_location_id != location_id => {
                    issues.push(Issue::new(
                        IssueKind::LocationMismatch,
                        format!(
                            "team {} ({}) at location {} is managed by provider {} whose primary location is {}",
                            team.name, team.id, location_id, p.id, p.primary_location_id
                        ),
                    ));
                    false
                }
                _ => true,
            }
        }
        (Some(provider_id), None) => {
            issues.push(Issue::new(
                IssueKind::OrphanedProviderRef,
                format!(
                    "team {} ({}) references provider record {} which no longer exists",
                    team.name, team.id, provider_id
                ),
            ));
            false
        }
        (None, _) => {
            if team.has_members() && !team.self_managed {
                issues.push(Issue::new(
                    IssueKind::TeamMissingProvider,
                    format!(
                        "team {} ({}) has {} members but no managing provider",
                        team.name, team.id, team.member_count
                    ),
                ));
            }
            false
        }
    };

    // Status/membership mismatch is a consistency warning on its own.
    if !team.is_active() && team.has_members() {
        issues.push(Issue::new(
            IssueKind::InactiveTeamWithMembers,
            format!(
                "inactive team {} ({}) still has {} active members",
                team.name, team.id, team.member_count
            ),
        ));
    }

    TeamAudit {
        team_id: team.id,
        has_provider,
        has_location,
        provider_valid,
        issues,
    }
}
