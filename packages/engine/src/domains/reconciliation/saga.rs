//! Per-user repair saga.
//!
//! A repair is a short state machine over three steps:
//!
//! ```text
//! AssignLocation -> SyncProvider -> LinkTeams
//! ```
//!
//! The saga enters at whichever step the user's current classification calls
//! for, and every step is an independently committed compare-and-set write.
//! A process that dies between steps leaves durable state that the next
//! run's classification maps back onto the correct entry step, so work is
//! neither redone nor skipped.

use std::time::Duration;

use tracing::{debug, info};

use crate::common::{LocationId, ProviderRecordId};
use crate::domains::assignments::analyzer::{AssignmentState, UnifiedAssignmentStatus};
use crate::domains::assignments::issues::IssueKind;
use crate::domains::assignments::models::{ApUser, AssignmentRole};
use crate::kernel::{timed, BaseEntityStore};

use super::strategy::LocationSelectionStrategy;
use super::FixError;

/// Steps of the per-user repair sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairStep {
    AssignLocation,
    SyncProvider,
    LinkTeams,
}

/// What one saga run did (or, in dry-run mode, would do).
#[derive(Debug, Clone, Default)]
pub struct RepairOutcome {
    pub assignments_created: u32,
    pub providers_created: u32,
    pub teams_linked: u32,
    /// The user's primary location after the run. In dry-run mode this is
    /// the location the planned assignment targets.
    pub primary_location: Option<LocationId>,
    /// The user's provider record after the run. Never set for a provider
    /// that only exists as a dry-run plan.
    pub provider_id: Option<ProviderRecordId>,
}

pub struct RepairSaga<'a> {
    store: &'a dyn BaseEntityStore,
    strategy: &'a dyn LocationSelectionStrategy,
    store_timeout: Duration,
    dry_run: bool,
}

impl<'a> RepairSaga<'a> {
    pub fn new(
        store: &'a dyn BaseEntityStore,
        strategy: &'a dyn LocationSelectionStrategy,
        store_timeout: Duration,
        dry_run: bool,
    ) -> Self {
        Self {
            store,
            strategy,
            store_timeout,
            dry_run,
        }
    }

    /// Map a classification onto the step the saga should resume at.
    ///
    /// Returns `None` when there is nothing safe to do: complete users need
    /// no repair, conflicts must never be written to, and promoting one of
    /// several unflagged assignments to primary would be an arbitrary
    /// choice.
    pub fn entry_step(status: &UnifiedAssignmentStatus) -> Option<RepairStep> {
        match status.state {
            AssignmentState::Missing => Some(RepairStep::AssignLocation),
            AssignmentState::Partial => {
                if status.has_issue(IssueKind::MissingPrimaryFlag) {
                    None
                } else if status.has_issue(IssueKind::MissingAssignment) {
                    Some(RepairStep::AssignLocation)
                } else if status.has_issue(IssueKind::MissingProvider) {
                    Some(RepairStep::SyncProvider)
                } else {
                    None
                }
            }
            AssignmentState::Complete | AssignmentState::Conflict => None,
        }
    }

    /// Run the saga from `entry` to the end.
    pub async fn run(&self, user: &ApUser, entry: RepairStep) -> Result<RepairOutcome, FixError> {
        let mut outcome = RepairOutcome::default();
        let mut step = entry;
        loop {
            step = match step {
                RepairStep::AssignLocation => {
                    self.assign_location(user, &mut outcome).await?;
                    RepairStep::SyncProvider
                }
                RepairStep::SyncProvider => {
                    self.sync_provider(user, &mut outcome).await?;
                    RepairStep::LinkTeams
                }
                RepairStep::LinkTeams => {
                    self.link_teams(user, &mut outcome).await?;
                    return Ok(outcome);
                }
            };
        }
    }

    /// Step 1: ensure the user has an active primary assignment.
    async fn assign_location(
        &self,
        user: &ApUser,
        outcome: &mut RepairOutcome,
    ) -> Result<(), FixError> {
        // Re-read immediately before writing: a concurrent run may have
        // repaired this user already.
        let current = timed(self.store_timeout, self.store.get_assignments(user.id)).await?;
        if let Some(primary) = current.iter().find(|a| a.is_active_primary()) {
            debug!(ap_user_id = %user.id, "primary assignment already present");
            outcome.primary_location = Some(primary.location_id);
            return Ok(());
        }

        // An existing provider record pins the target; otherwise the
        // selection strategy picks among open locations.
        let provider = timed(self.store_timeout, self.store.get_provider_record(user.id)).await?;
        let target = match provider.as_ref().filter(|p| p.is_approved()) {
            Some(p) => p.primary_location_id,
            None => {
                let available =
                    timed(self.store_timeout, self.store.list_available_locations()).await?;
                self.strategy
                    .select(user, &available)
                    .ok_or(FixError::NoCandidateLocation)?
                    .id
            }
        };

        if self.dry_run {
            outcome.assignments_created += 1;
            outcome.primary_location = Some(target);
            return Ok(());
        }

        match timed(
            self.store_timeout,
            self.store
                .create_assignment(user.id, target, true, AssignmentRole::Provider),
        )
        .await
        {
            Ok(assignment) => {
                info!(
                    ap_user_id = %user.id,
                    location_id = %assignment.location_id,
                    "created primary assignment"
                );
                outcome.assignments_created += 1;
                outcome.primary_location = Some(assignment.location_id);
                Ok(())
            }
            Err(e) if e.is_already_exists() => {
                // Lost the race: the assignment this step wanted now exists.
                debug!(ap_user_id = %user.id, "concurrent run created the assignment first");
                let current =
                    timed(self.store_timeout, self.store.get_assignments(user.id)).await?;
                outcome.primary_location = current
                    .iter()
                    .find(|a| a.is_active_primary())
                    .map(|a| a.location_id);
                Ok(())
            }
            Err(e) => Err(FixError::Store(e)),
        }
    }

    /// Step 2: ensure a provider record mirrors the primary assignment.
    async fn sync_provider(
        &self,
        user: &ApUser,
        outcome: &mut RepairOutcome,
    ) -> Result<(), FixError> {
        let primary_location = match outcome.primary_location {
            Some(location_id) => location_id,
            None => {
                let assignments =
                    timed(self.store_timeout, self.store.get_assignments(user.id)).await?;
                match assignments.iter().find(|a| a.is_active_primary()) {
                    Some(a) => {
                        outcome.primary_location = Some(a.location_id);
                        a.location_id
                    }
                    // The user changed shape mid-run; the next pass will
                    // reclassify and resume correctly.
                    None => return Ok(()),
                }
            }
        };

        let current = timed(self.store_timeout, self.store.get_provider_record(user.id)).await?;
        if let Some(p) = current {
            // An inactive record still blocks creation (one per user), but
            // teams must not be linked to it.
            if p.is_approved() {
                outcome.provider_id = Some(p.id);
            } else {
                debug!(ap_user_id = %user.id, "provider record exists but is inactive");
            }
            return Ok(());
        }

        if self.dry_run {
            outcome.providers_created += 1;
            return Ok(());
        }

        match timed(
            self.store_timeout,
            self.store.create_provider_record(user.id, primary_location),
        )
        .await
        {
            Ok(p) => {
                info!(
                    ap_user_id = %user.id,
                    provider_id = %p.id,
                    location_id = %primary_location,
                    "created auto-synced provider record"
                );
                outcome.providers_created += 1;
                outcome.provider_id = Some(p.id);
                Ok(())
            }
            Err(e) if e.is_already_exists() => {
                debug!(ap_user_id = %user.id, "concurrent run created the provider record first");
                let p = timed(self.store_timeout, self.store.get_provider_record(user.id)).await?;
                outcome.provider_id = p.filter(|p| p.is_approved()).map(|p| p.id);
                Ok(())
            }
            Err(e) => Err(FixError::Store(e)),
        }
    }

    /// Step 3: link unmanaged teams at the user's primary location to the
    /// user's provider record.
    async fn link_teams(&self, user: &ApUser, outcome: &mut RepairOutcome) -> Result<(), FixError> {
        let Some(location_id) = outcome.primary_location else {
            return Ok(());
        };
        let teams = timed(self.store_timeout, self.store.list_teams(Some(location_id))).await?;
        let unmanaged = teams.iter().filter(|t| t.needs_provider());

        if self.dry_run {
            // A planned provider has no id yet; the dry run still counts the
            // links the real run would create, but only when a provider
            // exists or is planned.
            if outcome.provider_id.is_some() || outcome.providers_created > 0 {
                outcome.teams_linked += unmanaged.count() as u32;
            }
            return Ok(());
        }
        let Some(provider_id) = outcome.provider_id else {
            return Ok(());
        };

        for team in unmanaged {
            match timed(
                self.store_timeout,
                self.store.set_team_provider(team.id, provider_id),
            )
            .await
            {
                Ok(()) => {
                    info!(
                        ap_user_id = %user.id,
                        team_id = %team.id,
                        provider_id = %provider_id,
                        "linked team to provider"
                    );
                    outcome.teams_linked += 1;
                }
                Err(e) if e.is_already_exists() => {
                    debug!(team_id = %team.id, "team already linked");
                }
                Err(e) => return Err(FixError::Store(e)),
            }
        }
        Ok(())
    }
}
