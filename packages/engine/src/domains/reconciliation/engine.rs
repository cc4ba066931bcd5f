//! The reconciliation engine: classification, repair, and health reporting
//! over the entity store.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::common::{ApUserId, LocationId, ProviderRecordId, TtlCache};
use crate::domains::assignments::analyzer::{
    analyze_assignment_status, AssignmentState, UnifiedAssignmentStatus,
};
use crate::domains::assignments::issues::{Issue, IssueKind};
use crate::domains::assignments::models::{ApUser, Location};
use crate::domains::health::report::{generate_report, SystemHealthReport, SystemIssue};
use crate::domains::teams::auditor::audit_team;
use crate::domains::teams::models::Team;
use crate::kernel::{timed, BaseEntityStore, StoreError};

use super::saga::RepairSaga;
use super::strategy::{FirstAvailable, LocationSelectionStrategy};
use super::FixError;

const LOCATIONS_CACHE_KEY: &str = "locations";

/// Tunables for one engine instance.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Concurrent per-entity classify/repair tasks, sized to the store's
    /// connection budget.
    pub max_concurrent_checks: usize,
    /// Bound on every individual store operation.
    pub store_timeout: Duration,
    /// How long the location list may be reused between store reads.
    pub location_cache_ttl: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_concurrent_checks: 8,
            store_timeout: Duration::from_secs(5),
            location_cache_ttl: Duration::from_secs(30),
        }
    }
}

/// Options for one reconcile run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOptions {
    /// Classify and count the writes a run would perform without executing
    /// any of them.
    pub dry_run: bool,
    /// Past this point no new entity fixes are scheduled; results
    /// accumulated so far are returned.
    pub deadline: Option<Instant>,
}

/// A per-entity failure recorded during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityError {
    pub entity: String,
    pub message: String,
}

impl EntityError {
    pub fn ap_user(id: ApUserId, message: impl Into<String>) -> Self {
        Self {
            entity: format!("ap_user {}", id),
            message: message.into(),
        }
    }

    pub fn team(team: &Team, message: impl Into<String>) -> Self {
        Self {
            entity: format!("team {}", team.id),
            message: message.into(),
        }
    }
}

/// Outcome of one reconcile run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileResult {
    pub fixed_assignments: u32,
    pub fixed_providers: u32,
    pub fixed_teams: u32,
    /// Users whose state is conflict; reported, never written to.
    pub unresolved_conflicts: u32,
    pub errors: Vec<EntityError>,
    pub scanned_users: u32,
    pub scanned_teams: u32,
    pub dry_run: bool,
    pub duration_ms: u64,
}

impl ReconcileResult {
    /// Total writes performed (or planned, for a dry run).
    pub fn total_fixes(&self) -> u32 {
        self.fixed_assignments + self.fixed_providers + self.fixed_teams
    }
}

/// What one user's pass through the repair phase produced.
#[derive(Default)]
struct UserPass {
    assignments_created: u32,
    providers_created: u32,
    teams_linked: u32,
    conflicted: bool,
    errors: Vec<EntityError>,
    /// Primary location and provider to feed the team sweep.
    link: Option<(LocationId, ProviderRecordId)>,
    /// Location whose teams the saga already handled (dry-run dedup).
    covered_location: Option<LocationId>,
}

/// Stateful orchestrator over the analyzers and the store.
///
/// Classification is recomputed from the store on every call; the engine
/// holds no derived state beyond a TTL-bounded location list, so overlapping
/// runs and restarts are always safe.
pub struct ReconciliationEngine {
    store: Arc<dyn BaseEntityStore>,
    strategy: Arc<dyn LocationSelectionStrategy>,
    settings: EngineSettings,
    locations: TtlCache<&'static str, Arc<Vec<Location>>>,
}

impl ReconciliationEngine {
    pub fn new(store: Arc<dyn BaseEntityStore>, settings: EngineSettings) -> Self {
        Self {
            locations: TtlCache::new(settings.location_cache_ttl),
            store,
            strategy: Arc::new(FirstAvailable),
            settings,
        }
    }

    /// Replace the location selection policy.
    pub fn with_strategy(mut self, strategy: Arc<dyn LocationSelectionStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    // ------------------------------------------------------------------
    // Classification (read path)
    // ------------------------------------------------------------------

    /// Derive one user's unified status from the store.
    pub async fn get_unified_status(
        &self,
        ap_user_id: ApUserId,
    ) -> Result<UnifiedAssignmentStatus, StoreError> {
        let user = timed(self.settings.store_timeout, self.store.get_ap_user(ap_user_id))
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("AP user {}", ap_user_id)))?;
        let known = self.known_location_ids().await?;
        self.classify_user(&user, &known).await
    }

    async fn known_locations(&self) -> Result<Arc<Vec<Location>>, StoreError> {
        if let Some(cached) = self.locations.get(&LOCATIONS_CACHE_KEY) {
            return Ok(cached);
        }
        let fresh = Arc::new(
            timed(self.settings.store_timeout, self.store.list_locations()).await?,
        );
        self.locations.insert(LOCATIONS_CACHE_KEY, fresh.clone());
        Ok(fresh)
    }

    async fn known_location_ids(&self) -> Result<HashSet<LocationId>, StoreError> {
        Ok(self.known_locations().await?.iter().map(|l| l.id).collect())
    }

    async fn classify_user(
        &self,
        user: &ApUser,
        known_locations: &HashSet<LocationId>,
    ) -> Result<UnifiedAssignmentStatus, StoreError> {
        let assignments =
            timed(self.settings.store_timeout, self.store.get_assignments(user.id)).await?;
        let provider = timed(
            self.settings.store_timeout,
            self.store.get_provider_record(user.id),
        )
        .await?;
        Ok(analyze_assignment_status(
            user,
            &assignments,
            provider.as_ref(),
            known_locations,
        ))
    }

    // ------------------------------------------------------------------
    // Health reporting
    // ------------------------------------------------------------------

    /// System-wide health over all users and teams.
    ///
    /// Per-entity store failures become issues inside the report; only a
    /// store that cannot even be enumerated degrades the whole report.
    pub async fn get_system_health_report(&self) -> SystemHealthReport {
        match self.build_health_report().await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "health report aborted, store unreachable");
                SystemHealthReport::degraded(&e.to_string())
            }
        }
    }

    async fn build_health_report(&self) -> Result<SystemHealthReport, StoreError> {
        let users = timed(self.settings.store_timeout, self.store.list_ap_users()).await?;
        let teams = timed(self.settings.store_timeout, self.store.list_teams(None)).await?;
        let locations = self.known_locations().await?;
        let known: HashSet<LocationId> = locations.iter().map(|l| l.id).collect();
        let by_id: HashMap<LocationId, &Location> =
            locations.iter().map(|l| (l.id, l)).collect();

        // Each user's classification is independent; fan out under the
        // concurrency bound and join before aggregating.
        let known_ref = &known;
        let classified: Vec<(&ApUser, Result<UnifiedAssignmentStatus, StoreError>)> =
            futures::stream::iter(
                users
                    .iter()
                    .map(|user| async move { (user, self.classify_user(user, known_ref).await) }),
            )
            .buffer_unordered(self.settings.max_concurrent_checks)
            .collect()
            .await;

        let mut statuses = Vec::with_capacity(users.len());
        let mut store_issues = Vec::new();
        for (user, result) in classified {
            match result {
                Ok(status) => statuses.push(status),
                Err(e) => {
                    warn!(ap_user_id = %user.id, error = %e, "classification failed");
                    store_issues.push(Issue::new(
                        IssueKind::StoreUnavailable,
                        format!("could not classify {}: {}", user.display_name, e),
                    ));
                }
            }
        }

        let mut audits = Vec::with_capacity(teams.len());
        for team in &teams {
            let location = team.location_id.and_then(|id| by_id.get(&id).copied());
            let provider = match team.provider_id {
                Some(provider_id) => {
                    match timed(
                        self.settings.store_timeout,
                        self.store.get_provider_record_by_id(provider_id),
                    )
                    .await
                    {
                        Ok(provider) => provider,
                        Err(e) => {
                            warn!(team_id = %team.id, error = %e, "team audit failed");
                            store_issues.push(Issue::new(
                                IssueKind::StoreUnavailable,
                                format!("could not audit team {}: {}", team.name, e),
                            ));
                            continue;
                        }
                    }
                }
                None => None,
            };
            audits.push(audit_team(team, location, provider.as_ref()));
        }

        let mut report = generate_report(&statuses, &audits);
        for issue in &store_issues {
            report.system_issues.push(SystemIssue::from_issue(issue));
        }
        if !store_issues.is_empty() {
            report
                .recommendations
                .push("Check entity store connectivity and re-run the report".to_string());
        }
        Ok(report)
    }

    // ------------------------------------------------------------------
    // Repair (write path)
    // ------------------------------------------------------------------

    /// Classify every user and repair the fixable states, then link
    /// providerless teams. Per-entity failures are collected, never thrown.
    pub async fn reconcile(
        &self,
        options: ReconcileOptions,
    ) -> Result<ReconcileResult, StoreError> {
        let started = Instant::now();
        let users = timed(self.settings.store_timeout, self.store.list_ap_users()).await?;
        let known = self.known_location_ids().await?;

        let mut result = ReconcileResult {
            dry_run: options.dry_run,
            scanned_users: users.len() as u32,
            ..Default::default()
        };

        let known_ref = &known;
        let options_ref = &options;
        let passes: Vec<UserPass> = futures::stream::iter(
            users
                .iter()
                .map(|user| async move { self.repair_user(user, known_ref, options_ref).await }),
        )
        .buffer_unordered(self.settings.max_concurrent_checks)
        .collect()
        .await;

        let mut link_map: HashMap<LocationId, ProviderRecordId> = HashMap::new();
        let mut covered: HashSet<LocationId> = HashSet::new();
        for pass in passes {
            result.fixed_assignments += pass.assignments_created;
            result.fixed_providers += pass.providers_created;
            result.fixed_teams += pass.teams_linked;
            result.unresolved_conflicts += u32::from(pass.conflicted);
            result.errors.extend(pass.errors);
            if let Some((location_id, provider_id)) = pass.link {
                link_map.insert(location_id, provider_id);
            }
            if let Some(location_id) = pass.covered_location {
                covered.insert(location_id);
            }
        }

        if !deadline_passed(options.deadline) {
            self.sweep_teams(&link_map, &covered, options.dry_run, &mut result)
                .await;
        }

        result.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            fixed_assignments = result.fixed_assignments,
            fixed_providers = result.fixed_providers,
            fixed_teams = result.fixed_teams,
            unresolved_conflicts = result.unresolved_conflicts,
            errors = result.errors.len(),
            dry_run = result.dry_run,
            "reconciliation finished"
        );
        Ok(result)
    }

    async fn repair_user(
        &self,
        user: &ApUser,
        known_locations: &HashSet<LocationId>,
        options: &ReconcileOptions,
    ) -> UserPass {
        let mut pass = UserPass::default();
        if deadline_passed(options.deadline) {
            debug!(ap_user_id = %user.id, "deadline reached, fix not scheduled");
            return pass;
        }

        let status = match self.classify_user(user, known_locations).await {
            Ok(status) => status,
            Err(e) => {
                warn!(ap_user_id = %user.id, error = %e, "classification failed");
                pass.errors.push(EntityError::ap_user(
                    user.id,
                    format!("classification failed: {}", e),
                ));
                return pass;
            }
        };

        // Conflicts and orphans are surfaced, never written to.
        for issue in &status.issues {
            match issue.kind {
                IssueKind::LocationMismatch | IssueKind::MultiplePrimaryAssignments => {
                    pass.errors.push(EntityError::ap_user(
                        user.id,
                        FixError::Conflict(issue.message.clone()).to_string(),
                    ));
                }
                IssueKind::OrphanedLocationRef => {
                    pass.errors.push(EntityError::ap_user(
                        user.id,
                        FixError::OrphanReference(issue.message.clone()).to_string(),
                    ));
                }
                _ => {}
            }
        }
        if status.state == AssignmentState::Conflict {
            pass.conflicted = true;
            return pass;
        }

        let Some(entry) = RepairSaga::entry_step(&status) else {
            // Nothing to repair; a complete user still feeds the team sweep.
            if let (Some(assignment), Some(provider)) = (
                &status.primary_assignment,
                status.provider.as_ref().filter(|p| p.is_approved()),
            ) {
                pass.link = Some((assignment.location_id, provider.id));
            }
            return pass;
        };

        let saga = RepairSaga::new(
            self.store.as_ref(),
            self.strategy.as_ref(),
            self.settings.store_timeout,
            options.dry_run,
        );
        match saga.run(user, entry).await {
            Ok(outcome) => {
                pass.assignments_created = outcome.assignments_created;
                pass.providers_created = outcome.providers_created;
                pass.teams_linked = outcome.teams_linked;
                pass.covered_location = outcome.primary_location;
                if let (Some(location_id), Some(provider_id)) =
                    (outcome.primary_location, outcome.provider_id)
                {
                    pass.link = Some((location_id, provider_id));
                }
            }
            Err(FixError::NoCandidateLocation) => {
                info!(ap_user_id = %user.id, "no available location, user left unassigned");
                pass.errors.push(EntityError::ap_user(
                    user.id,
                    FixError::NoCandidateLocation.to_string(),
                ));
            }
            Err(e) => {
                warn!(ap_user_id = %user.id, error = %e, "repair failed");
                pass.errors.push(EntityError::ap_user(user.id, e.to_string()));
            }
        }
        pass
    }

    /// Link remaining providerless teams to providers whose users were
    /// already complete before this run.
    async fn sweep_teams(
        &self,
        link_map: &HashMap<LocationId, ProviderRecordId>,
        covered: &HashSet<LocationId>,
        dry_run: bool,
        result: &mut ReconcileResult,
    ) {
        let teams = match timed(self.settings.store_timeout, self.store.list_teams(None)).await {
            Ok(teams) => teams,
            Err(e) => {
                warn!(error = %e, "team sweep skipped, could not enumerate teams");
                result.errors.push(EntityError {
                    entity: "teams".to_string(),
                    message: format!("could not enumerate teams: {}", e),
                });
                return;
            }
        };
        result.scanned_teams = teams.len() as u32;

        for team in teams.iter().filter(|t| t.needs_provider()) {
            let Some(location_id) = team.location_id else {
                continue;
            };
            // The saga already counted this location's links in a dry run.
            if dry_run && covered.contains(&location_id) {
                continue;
            }
            let Some(&provider_id) = link_map.get(&location_id) else {
                continue;
            };
            if dry_run {
                result.fixed_teams += 1;
                continue;
            }
            match timed(
                self.settings.store_timeout,
                self.store.set_team_provider(team.id, provider_id),
            )
            .await
            {
                Ok(()) => {
                    info!(team_id = %team.id, provider_id = %provider_id, "linked team to provider");
                    result.fixed_teams += 1;
                }
                Err(e) if e.is_already_exists() => {
                    debug!(team_id = %team.id, "team already linked");
                }
                Err(e) => {
                    warn!(team_id = %team.id, error = %e, "team link failed");
                    result.errors.push(EntityError::team(team, e.to_string()));
                }
            }
        }
    }
}

fn deadline_passed(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::InMemoryEntityStore;

    #[test]
    fn test_default_settings_are_bounded() {
        let settings = EngineSettings::default();
        assert!(settings.max_concurrent_checks > 0);
        assert!(settings.store_timeout > Duration::ZERO);
    }

    #[tokio::test]
    async fn test_expired_deadline_schedules_no_fixes() {
        let store = Arc::new(InMemoryEntityStore::new());
        store.add_user("Dana Reyes", "dana@example.org");
        store.add_location("Northside Clinic");

        let engine = ReconciliationEngine::new(store.clone(), EngineSettings::default());
        let result = engine
            .reconcile(ReconcileOptions {
                dry_run: false,
                deadline: Some(Instant::now()),
            })
            .await
            .unwrap();

        assert_eq!(result.total_fixes(), 0);
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let store = Arc::new(InMemoryEntityStore::new());
        let engine = ReconciliationEngine::new(store, EngineSettings::default());
        let err = engine.get_unified_status(ApUserId::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
