//! System-wide health scoring.
//!
//! Pure aggregation over already-computed per-entity statuses; nothing here
//! touches the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domains::assignments::analyzer::{AssignmentState, UnifiedAssignmentStatus};
use crate::domains::assignments::issues::{Issue, IssueKind, Severity};
use crate::domains::teams::auditor::TeamAudit;

/// Per-state counts over all AP users.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserSummary {
    pub properly_assigned: u32,
    pub partially_assigned: u32,
    pub unassigned: u32,
    pub conflicts: u32,
}

/// Counts over all teams.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamSummary {
    pub total_teams: u32,
    pub teams_with_providers: u32,
    /// Teams whose provider reference no longer resolves.
    pub orphaned_teams: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthSummary {
    pub users: UserSummary,
    pub teams: TeamSummary,
}

/// One issue in the system-wide list, tagged with its classification from
/// the taxonomy table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemIssue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub auto_fixable: bool,
    pub message: String,
}

impl SystemIssue {
    pub fn from_issue(issue: &Issue) -> Self {
        Self {
            kind: issue.kind,
            severity: issue.kind.severity(),
            auto_fixable: issue.kind.auto_fixable(),
            message: issue.message.clone(),
        }
    }
}

/// The report consumed by dashboards and the operator CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemHealthReport {
    pub summary: HealthSummary,
    /// 0..=100; the share of users and teams in their target state.
    pub overall_score: u8,
    pub system_issues: Vec<SystemIssue>,
    pub recommendations: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

impl SystemHealthReport {
    /// Minimal report for the one fatal path: the store cannot even be
    /// enumerated.
    pub fn degraded(detail: &str) -> Self {
        Self {
            summary: HealthSummary::default(),
            overall_score: 0,
            system_issues: vec![SystemIssue {
                kind: IssueKind::StoreUnavailable,
                severity: Severity::Critical,
                auto_fixable: false,
                message: format!("could not enumerate AP users and teams: {}", detail),
            }],
            recommendations: vec![
                "Check entity store connectivity and re-run the report".to_string()
            ],
            generated_at: Utc::now(),
        }
    }

    pub fn critical_issues(&self) -> impl Iterator<Item = &SystemIssue> {
        self.system_issues
            .iter()
            .filter(|i| i.severity == Severity::Critical)
    }
}

/// Aggregate per-entity classifications into the system-wide report.
pub fn generate_report(
    user_statuses: &[UnifiedAssignmentStatus],
    team_audits: &[TeamAudit],
) -> SystemHealthReport {
    let mut users = UserSummary::default();
    for status in user_statuses {
        match status.state {
            AssignmentState::Complete => users.properly_assigned += 1,
            AssignmentState::Partial => users.partially_assigned += 1,
            AssignmentState::Missing => users.unassigned += 1,
            AssignmentState::Conflict => users.conflicts += 1,
        }
    }

    let mut teams = TeamSummary {
        total_teams: team_audits.len() as u32,
        ..Default::default()
    };
    for audit in team_audits {
        if audit.has_provider && audit.provider_valid {
            teams.teams_with_providers += 1;
        }
        if audit.has_issue(IssueKind::OrphanedProviderRef) {
            teams.orphaned_teams += 1;
        }
    }

    let overall_score = score(
        users.properly_assigned + teams.teams_with_providers,
        user_statuses.len() as u32 + teams.total_teams,
    );

    let system_issues: Vec<SystemIssue> = user_statuses
        .iter()
        .flat_map(|s| s.issues.iter())
        .chain(team_audits.iter().flat_map(|a| a.issues.iter()))
        .map(SystemIssue::from_issue)
        .collect();

    let recommendations = build_recommendations(&users, team_audits, &system_issues);

    SystemHealthReport {
        summary: HealthSummary { users, teams },
        overall_score,
        system_issues,
        recommendations,
        generated_at: Utc::now(),
    }
}

/// Share of entities in their target state, rounded and clamped to 0..=100.
/// An empty system is healthy by definition.
fn score(in_target_state: u32, total: u32) -> u8 {
    if total == 0 {
        return 100;
    }
    let ratio = 100.0 * f64::from(in_target_state) / f64::from(total);
    ratio.round().clamp(0.0, 100.0) as u8
}

/// Recommendations come from the summary counts, never from matching on
/// issue message text.
fn build_recommendations(
    users: &UserSummary,
    team_audits: &[TeamAudit],
    system_issues: &[SystemIssue],
) -> Vec<String> {
    let mut recommendations = Vec::new();

    if users.unassigned > 0 {
        recommendations.push(format!(
            "Assign {} unassigned AP users to locations",
            users.unassigned
        ));
    }
    if users.partially_assigned > 0 {
        recommendations.push(format!(
            "Run reconciliation to complete {} partially assigned AP users",
            users.partially_assigned
        ));
    }
    if users.conflicts > 0 {
        recommendations.push(format!(
            "Manually review {} AP users with conflicting assignment data",
            users.conflicts
        ));
    }

    let unmanaged_teams = team_audits
        .iter()
        .filter(|a| a.has_issue(IssueKind::TeamMissingProvider))
        .count();
    if unmanaged_teams > 0 {
        recommendations.push(format!(
            "Link {} teams with members to providers at their locations",
            unmanaged_teams
        ));
    }

    let orphans = system_issues
        .iter()
        .filter(|i| {
            matches!(
                i.kind,
                IssueKind::OrphanedLocationRef | IssueKind::OrphanedProviderRef
            )
        })
        .count();
    if orphans > 0 {
        recommendations.push(format!(
            "Clean up {} orphaned references to deleted records",
            orphans
        ));
    }

    if recommendations.is_empty() {
        recommendations.push("No action needed; all AP users and teams are consistent".to_string());
    }
    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ApUserId, TeamId};

    fn user_status(state: AssignmentState, issues: Vec<Issue>) -> UnifiedAssignmentStatus {
        UnifiedAssignmentStatus {
            ap_user_id: ApUserId::new(),
            state,
            issues,
            recommendations: vec![],
            primary_assignment: None,
            provider: None,
        }
    }

    fn team_audit(has_provider: bool, provider_valid: bool, issues: Vec<Issue>) -> TeamAudit {
        TeamAudit {
            team_id: TeamId::new(),
            has_provider,
            has_location: true,
            provider_valid,
            issues,
        }
    }

    #[test]
    fn test_empty_system_scores_100() {
        let report = generate_report(&[], &[]);
        assert_eq!(report.overall_score, 100);
        assert!(report.system_issues.is_empty());
    }

    #[test]
    fn test_summary_counts_by_state() {
        let statuses = vec![
            user_status(AssignmentState::Complete, vec![]),
            user_status(AssignmentState::Complete, vec![]),
            user_status(AssignmentState::Partial, vec![]),
            user_status(AssignmentState::Missing, vec![]),
            user_status(AssignmentState::Conflict, vec![]),
        ];
        let report = generate_report(&statuses, &[]);
        assert_eq!(report.summary.users.properly_assigned, 2);
        assert_eq!(report.summary.users.partially_assigned, 1);
        assert_eq!(report.summary.users.unassigned, 1);
        assert_eq!(report.summary.users.conflicts, 1);
    }

    #[test]
    fn test_score_formula() {
        // 2 complete users + 1 linked team over 4 users + 2 teams = 50%
        let statuses = vec![
            user_status(AssignmentState::Complete, vec![]),
            user_status(AssignmentState::Complete, vec![]),
            user_status(AssignmentState::Partial, vec![]),
            user_status(AssignmentState::Missing, vec![]),
        ];
        let audits = vec![
            team_audit(true, true, vec![]),
            team_audit(false, false, vec![]),
        ];
        let report = generate_report(&statuses, &audits);
        assert_eq!(report.overall_score, 50);
    }

    #[test]
    fn test_invalid_provider_link_does_not_count() {
        let audits = vec![team_audit(
            true,
            false,
            vec![Issue::new(IssueKind::OrphanedProviderRef, "dangling")],
        )];
        let report = generate_report(&[], &audits);
        assert_eq!(report.summary.teams.teams_with_providers, 0);
        assert_eq!(report.summary.teams.orphaned_teams, 1);
    }

    #[test]
    fn test_issues_are_tagged_from_taxonomy() {
        let statuses = vec![user_status(
            AssignmentState::Conflict,
            vec![Issue::new(IssueKind::LocationMismatch, "A vs B")],
        )];
        let report = generate_report(&statuses, &[]);
        let issue = &report.system_issues[0];
        assert_eq!(issue.severity, Severity::Critical);
        assert!(!issue.auto_fixable);
    }

    #[test]
    fn test_warnings_are_fixable() {
        let statuses = vec![user_status(
            AssignmentState::Partial,
            vec![Issue::new(IssueKind::MissingProvider, "no provider")],
        )];
        let report = generate_report(&statuses, &[]);
        let issue = &report.system_issues[0];
        assert_eq!(issue.severity, Severity::Warning);
        assert!(issue.auto_fixable);
    }

    #[test]
    fn test_recommendations_from_counts() {
        let statuses = vec![
            user_status(AssignmentState::Missing, vec![]),
            user_status(AssignmentState::Missing, vec![]),
            user_status(AssignmentState::Conflict, vec![]),
        ];
        let report = generate_report(&statuses, &[]);
        assert!(report
            .recommendations
            .iter()
            .any(|r| r == "Assign 2 unassigned AP users to locations"));
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.contains("Manually review 1 AP users")));
    }

    #[test]
    fn test_healthy_system_recommends_nothing_to_do() {
        let statuses = vec![user_status(AssignmentState::Complete, vec![])];
        let report = generate_report(&statuses, &[]);
        assert_eq!(report.overall_score, 100);
        assert_eq!(report.recommendations.len(), 1);
        assert!(report.recommendations[0].contains("No action needed"));
    }

    #[test]
    fn test_degraded_report_shape() {
        let report = SystemHealthReport::degraded("connection refused");
        assert_eq!(report.overall_score, 0);
        assert_eq!(report.system_issues.len(), 1);
        assert_eq!(report.system_issues[0].kind, IssueKind::StoreUnavailable);
        assert_eq!(report.system_issues[0].severity, Severity::Critical);
        assert!(report.recommendations[0].contains("connectivity"));
    }

    #[test]
    fn test_score_rounds_to_nearest() {
        // 1 of 3 entities healthy = 33.33 -> 33
        let statuses = vec![
            user_status(AssignmentState::Complete, vec![]),
            user_status(AssignmentState::Missing, vec![]),
            user_status(AssignmentState::Missing, vec![]),
        ];
        let report = generate_report(&statuses, &[]);
        assert_eq!(report.overall_score, 33);
    }
}
