// InMemoryEntityStore - in-memory implementation of the store contract
//
// Backs the engine test suites and local experiments. Mutation semantics
// (conflict-on-write for primary assignments, provider records, and team
// links) mirror the unique indexes the Postgres store relies on.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use crate::common::{ApUserId, AssignmentId, LocationId, ProviderRecordId, TeamId};
use crate::domains::assignments::models::{
    ApUser, AssignmentRole, AssignmentStatus, Location, LocationAssignment, ProviderRecord,
    ProviderStatus,
};
use crate::domains::teams::models::Team;

use super::traits::{BaseEntityStore, StoreError};

#[derive(Default)]
struct Tables {
    users: Vec<ApUser>,
    locations: Vec<Location>,
    assignments: Vec<LocationAssignment>,
    providers: Vec<ProviderRecord>,
    teams: Vec<Team>,
}

/// In-memory entity store with the same compare-and-set discipline as the
/// Postgres implementation.
#[derive(Default)]
pub struct InMemoryEntityStore {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
    writes: AtomicU32,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Seeding
    // ------------------------------------------------------------------

    pub fn add_user(&self, display_name: &str, email: &str) -> ApUserId {
        let id = ApUserId::new();
        self.tables.lock().unwrap().users.push(ApUser {
            id,
            display_name: display_name.to_string(),
            email: email.to_string(),
        });
        id
    }

    pub fn add_location(&self, name: &str) -> LocationId {
        let id = LocationId::new();
        self.tables.lock().unwrap().locations.push(Location {
            id,
            name: name.to_string(),
        });
        id
    }

    /// Remove a location, leaving any references to it dangling.
    pub fn remove_location(&self, location_id: LocationId) {
        self.tables
            .lock()
            .unwrap()
            .locations
            .retain(|l| l.id != location_id);
    }

    pub fn add_assignment(
        &self,
        ap_user_id: ApUserId,
        location_id: LocationId,
        is_primary: bool,
        status: AssignmentStatus,
    ) -> AssignmentId {
        let mut tables = self.tables.lock().unwrap();
        let location_name = tables
            .locations
            .iter()
            .find(|l| l.id == location_id)
            .map(|l| l.name.clone())
            .unwrap_or_else(|| "(deleted)".to_string());
        let id = AssignmentId::new();
        tables.assignments.push(LocationAssignment {
            id,
            ap_user_id,
            location_id,
            location_name,
            is_primary,
            role: AssignmentRole::Provider,
            status,
            assigned_at: Utc::now(),
        });
        id
    }

    pub fn add_provider_record(
        &self,
        ap_user_id: ApUserId,
        primary_location_id: LocationId,
        status: ProviderStatus,
    ) -> ProviderRecordId {
        let mut tables = self.tables.lock().unwrap();
        let primary_location_name = tables
            .locations
            .iter()
            .find(|l| l.id == primary_location_id)
            .map(|l| l.name.clone())
            .unwrap_or_else(|| "(deleted)".to_string());
        let id = ProviderRecordId::new();
        tables.providers.push(ProviderRecord {
            id,
            ap_user_id,
            status,
            primary_location_id,
            primary_location_name,
            auto_synced: false,
        });
        id
    }

    pub fn add_team(
        &self,
        name: &str,
        location_id: Option<LocationId>,
        provider_id: Option<ProviderRecordId>,
        member_count: i32,
    ) -> TeamId {
        let id = TeamId::new();
        self.tables.lock().unwrap().teams.push(Team {
            id,
            name: name.to_string(),
            location_id,
            provider_id,
            member_count,
            status: crate::domains::teams::models::TeamStatus::Active,
            self_managed: false,
        });
        id
    }

    pub fn mark_team_self_managed(&self, team_id: TeamId) {
        let mut tables = self.tables.lock().unwrap();
        if let Some(team) = tables.teams.iter_mut().find(|t| t.id == team_id) {
            team.self_managed = true;
        }
    }

    pub fn deactivate_team(&self, team_id: TeamId) {
        let mut tables = self.tables.lock().unwrap();
        if let Some(team) = tables.teams.iter_mut().find(|t| t.id == team_id) {
            team.status = crate::domains::teams::models::TeamStatus::Inactive;
        }
    }

    // ------------------------------------------------------------------
    // Test instrumentation
    // ------------------------------------------------------------------

    /// Simulate total store connectivity loss.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of successful mutations performed through the contract.
    pub fn write_count(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn team(&self, team_id: TeamId) -> Option<Team> {
        self.tables
            .lock()
            .unwrap()
            .teams
            .iter()
            .find(|t| t.id == team_id)
            .cloned()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable(
                "connection refused (simulated)".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BaseEntityStore for InMemoryEntityStore {
    async fn list_ap_users(&self) -> Result<Vec<ApUser>, StoreError> {
        self.check_available()?;
        Ok(self.tables.lock().unwrap().users.clone())
    }

    async fn get_ap_user(&self, ap_user_id: ApUserId) -> Result<Option<ApUser>, StoreError> {
        self.check_available()?;
        Ok(self
            .tables
            .lock()
            .unwrap()
            .users
            .iter()
            .find(|u| u.id == ap_user_id)
            .cloned())
    }

    async fn get_assignments(
        &self,
        ap_user_id: ApUserId,
    ) -> Result<Vec<LocationAssignment>, StoreError> {
        self.check_available()?;
        Ok(self
            .tables
            .lock()
            .unwrap()
            .assignments
            .iter()
            .filter(|a| a.ap_user_id == ap_user_id)
            .cloned()
            .collect())
    }

    async fn get_provider_record(
        &self,
        ap_user_id: ApUserId,
    ) -> Result<Option<ProviderRecord>, StoreError> {
        self.check_available()?;
        Ok(self
            .tables
            .lock()
            .unwrap()
            .providers
            .iter()
            .find(|p| p.ap_user_id == ap_user_id)
            .cloned())
    }

    async fn get_provider_record_by_id(
        &self,
        provider_id: ProviderRecordId,
    ) -> Result<Option<ProviderRecord>, StoreError> {
        self.check_available()?;
        Ok(self
            .tables
            .lock()
            .unwrap()
            .providers
            .iter()
            .find(|p| p.id == provider_id)
            .cloned())
    }

    async fn list_locations(&self) -> Result<Vec<Location>, StoreError> {
        self.check_available()?;
        Ok(self.tables.lock().unwrap().locations.clone())
    }

    async fn list_available_locations(&self) -> Result<Vec<Location>, StoreError> {
        self.check_available()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .locations
            .iter()
            .filter(|l| {
                !tables
                    .assignments
                    .iter()
                    .any(|a| a.location_id == l.id && a.is_active_primary())
            })
            .cloned()
            .collect())
    }

    async fn create_assignment(
        &self,
        ap_user_id: ApUserId,
        location_id: LocationId,
        is_primary: bool,
        role: AssignmentRole,
    ) -> Result<LocationAssignment, StoreError> {
        self.check_available()?;
        let mut tables = self.tables.lock().unwrap();

        if is_primary
            && tables
                .assignments
                .iter()
                .any(|a| a.ap_user_id == ap_user_id && a.is_active_primary())
        {
            return Err(StoreError::AlreadyExists(format!(
                "active primary assignment for AP user {}",
                ap_user_id
            )));
        }

        let location_name = tables
            .locations
            .iter()
            .find(|l| l.id == location_id)
            .map(|l| l.name.clone())
            .ok_or_else(|| StoreError::NotFound(format!("location {}", location_id)))?;

        let assignment = LocationAssignment {
            id: AssignmentId::new(),
            ap_user_id,
            location_id,
            location_name,
            is_primary,
            role,
            status: AssignmentStatus::Active,
            assigned_at: Utc::now(),
        };
        tables.assignments.push(assignment.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(assignment)
    }

    async fn create_provider_record(
        &self,
        ap_user_id: ApUserId,
        primary_location_id: LocationId,
    ) -> Result<ProviderRecord, StoreError> {
        self.check_available()?;
        let mut tables = self.tables.lock().unwrap();

        if tables.providers.iter().any(|p| p.ap_user_id == ap_user_id) {
            return Err(StoreError::AlreadyExists(format!(
                "provider record for AP user {}",
                ap_user_id
            )));
        }

        let primary_location_name = tables
            .locations
            .iter()
            .find(|l| l.id == primary_location_id)
            .map(|l| l.name.clone())
            .ok_or_else(|| StoreError::NotFound(format!("location {}", primary_location_id)))?;

        let record = ProviderRecord {
            id: ProviderRecordId::new(),
            ap_user_id,
            status: ProviderStatus::Approved,
            primary_location_id,
            primary_location_name,
            auto_synced: true,
        };
        tables.providers.push(record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(record)
    }

    async fn list_teams(&self, location_id: Option<LocationId>) -> Result<Vec<Team>, StoreError> {
        self.check_available()?;
        Ok(self
            .tables
            .lock()
            .unwrap()
            .teams
            .iter()
            .filter(|t| location_id.is_none() || t.location_id == location_id)
            .cloned()
            .collect())
    }

    async fn set_team_provider(
        &self,
        team_id: TeamId,
        provider_id: ProviderRecordId,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let mut tables = self.tables.lock().unwrap();
        let team = tables
            .teams
            .iter_mut()
            .find(|t| t.id == team_id)
            .ok_or_else(|| StoreError::NotFound(format!("team {}", team_id)))?;

        if team.provider_id.is_some() {
            return Err(StoreError::AlreadyExists(format!(
                "provider link on team {}",
                team_id
            )));
        }

        team.provider_id = Some(provider_id);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_assignment_enforces_single_primary() {
        let store = InMemoryEntityStore::new();
        let user = store.add_user("Dana Reyes", "dana@example.org");
        let loc = store.add_location("Northside Clinic");

        store
            .create_assignment(user, loc, true, AssignmentRole::Provider)
            .await
            .unwrap();
        let second = store
            .create_assignment(user, loc, true, AssignmentRole::Provider)
            .await;
        assert!(matches!(second, Err(StoreError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_non_primary_assignments_do_not_conflict() {
        let store = InMemoryEntityStore::new();
        let user = store.add_user("Dana Reyes", "dana@example.org");
        let loc = store.add_location("Northside Clinic");

        store
            .create_assignment(user, loc, true, AssignmentRole::Provider)
            .await
            .unwrap();
        let secondary = store
            .create_assignment(user, loc, false, AssignmentRole::Supervisor)
            .await;
        assert!(secondary.is_ok());
    }

    #[tokio::test]
    async fn test_create_provider_record_is_one_per_user() {
        let store = InMemoryEntityStore::new();
        let user = store.add_user("Dana Reyes", "dana@example.org");
        let loc = store.add_location("Northside Clinic");

        store.create_provider_record(user, loc).await.unwrap();
        let second = store.create_provider_record(user, loc).await;
        assert!(matches!(second, Err(StoreError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_set_team_provider_is_compare_and_set() {
        let store = InMemoryEntityStore::new();
        let user = store.add_user("Dana Reyes", "dana@example.org");
        let loc = store.add_location("Northside Clinic");
        let provider = store.add_provider_record(user, loc, ProviderStatus::Approved);
        let team = store.add_team("Cohort 12", Some(loc), None, 5);

        store.set_team_provider(team, provider).await.unwrap();
        let second = store.set_team_provider(team, provider).await;
        assert!(matches!(second, Err(StoreError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_available_locations_excludes_claimed_ones() {
        let store = InMemoryEntityStore::new();
        let user = store.add_user("Dana Reyes", "dana@example.org");
        let claimed = store.add_location("Northside Clinic");
        let open = store.add_location("Lakeview Center");
        store.add_assignment(user, claimed, true, AssignmentStatus::Active);

        let available = store.list_available_locations().await.unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].id, open);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_reads() {
        let store = InMemoryEntityStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.list_ap_users().await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_write_count_tracks_mutations() {
        let store = InMemoryEntityStore::new();
        let user = store.add_user("Dana Reyes", "dana@example.org");
        let loc = store.add_location("Northside Clinic");
        assert_eq!(store.write_count(), 0);

        store
            .create_assignment(user, loc, true, AssignmentRole::Provider)
            .await
            .unwrap();
        store.create_provider_record(user, loc).await.unwrap();
        assert_eq!(store.write_count(), 2);
    }
}
