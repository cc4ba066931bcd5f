//! End-to-end reconciliation behavior over the in-memory store.

mod common;

use std::sync::Arc;

use engine_core::domains::assignments::analyzer::AssignmentState;
use engine_core::domains::assignments::models::{AssignmentStatus, ProviderStatus};
use engine_core::domains::reconciliation::ReconcileOptions;
use engine_core::kernel::{BaseEntityStore, InMemoryEntityStore};

use common::engine;

#[tokio::test]
async fn test_missing_user_is_fully_provisioned() {
    // Scenario: a user with no assignment and no provider, one open location.
    let store = Arc::new(InMemoryEntityStore::new());
    let user = store.add_user("Dana Reyes", "dana@example.org");
    let location = store.add_location("Northside Clinic");

    let engine = engine(store.clone());
    let result = engine.reconcile(ReconcileOptions::default()).await.unwrap();

    assert_eq!(result.fixed_assignments, 1);
    assert_eq!(result.fixed_providers, 1);
    assert!(result.errors.is_empty());

    let assignments = store.get_assignments(user).await.unwrap();
    assert_eq!(assignments.len(), 1);
    assert!(assignments[0].is_primary);
    assert_eq!(assignments[0].location_id, location);

    let provider = store.get_provider_record(user).await.unwrap().unwrap();
    assert_eq!(provider.primary_location_id, location);
    assert!(provider.auto_synced);
    assert_eq!(provider.status, ProviderStatus::Approved);

    let status = engine.get_unified_status(user).await.unwrap();
    assert_eq!(status.state, AssignmentState::Complete);
}

#[tokio::test]
async fn test_conflicting_user_is_never_written_to() {
    // Scenario: primary assignment at A, provider record at B.
    let store = Arc::new(InMemoryEntityStore::new());
    let user = store.add_user("Dana Reyes", "dana@example.org");
    let location_a = store.add_location("Northside Clinic");
    let location_b = store.add_location("Lakeview Center");
    store.add_assignment(user, location_a, true, AssignmentStatus::Active);
    store.add_provider_record(user, location_b, ProviderStatus::Approved);

    let engine = engine(store.clone());
    let status = engine.get_unified_status(user).await.unwrap();
    assert_eq!(status.state, AssignmentState::Conflict);

    let writes_before = store.write_count();
    let result = engine.reconcile(ReconcileOptions::default()).await.unwrap();

    assert_eq!(result.total_fixes(), 0);
    assert_eq!(result.unresolved_conflicts, 1);
    assert_eq!(store.write_count(), writes_before);

    // The reported issue names both locations.
    let conflict = result
        .errors
        .iter()
        .find(|e| e.message.contains("manual review"))
        .expect("conflict should be reported");
    assert!(conflict.message.contains(&location_a.to_string()));
    assert!(conflict.message.contains(&location_b.to_string()));
}

#[tokio::test]
async fn test_team_is_linked_to_provider_at_its_location() {
    // Scenario: a complete user at L, a providerless team with members at L.
    let store = Arc::new(InMemoryEntityStore::new());
    let user = store.add_user("Dana Reyes", "dana@example.org");
    let location = store.add_location("Northside Clinic");
    store.add_assignment(user, location, true, AssignmentStatus::Active);
    let provider = store.add_provider_record(user, location, ProviderStatus::Approved);
    let team = store.add_team("Cohort 12", Some(location), None, 5);

    let engine = engine(store.clone());
    let result = engine.reconcile(ReconcileOptions::default()).await.unwrap();

    assert_eq!(result.fixed_teams, 1);
    assert_eq!(store.team(team).unwrap().provider_id, Some(provider));
}

#[tokio::test]
async fn test_concurrent_runs_create_exactly_one_assignment() {
    // Scenario: two overlapping runs race to fix the same missing user.
    let store = Arc::new(InMemoryEntityStore::new());
    let user = store.add_user("Dana Reyes", "dana@example.org");
    store.add_location("Northside Clinic");

    let engine_a = engine(store.clone());
    let engine_b = engine(store.clone());

    let (result_a, result_b) = tokio::join!(
        engine_a.reconcile(ReconcileOptions::default()),
        engine_b.reconcile(ReconcileOptions::default()),
    );
    let (result_a, result_b) = (result_a.unwrap(), result_b.unwrap());

    // The losing run treats the conflict-on-write as already fixed.
    assert_eq!(result_a.fixed_assignments + result_b.fixed_assignments, 1);
    assert_eq!(result_a.fixed_providers + result_b.fixed_providers, 1);
    assert_eq!(store.get_assignments(user).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_reconcile_is_idempotent() {
    let store = Arc::new(InMemoryEntityStore::new());
    store.add_user("Dana Reyes", "dana@example.org");
    let partial = store.add_user("Noa Lindberg", "noa@example.org");
    let location_a = store.add_location("Northside Clinic");
    let location_b = store.add_location("Lakeview Center");
    store.add_assignment(partial, location_b, true, AssignmentStatus::Active);
    store.add_team("Cohort 12", Some(location_a), None, 4);
    store.add_team("Cohort 13", Some(location_b), None, 3);

    let engine = engine(store.clone());
    let first = engine.reconcile(ReconcileOptions::default()).await.unwrap();
    assert!(first.total_fixes() > 0);
    assert!(first.errors.is_empty());

    let second = engine.reconcile(ReconcileOptions::default()).await.unwrap();
    assert_eq!(second.total_fixes(), 0);
}

#[tokio::test]
async fn test_complete_users_agree_on_location_after_fix() {
    let store = Arc::new(InMemoryEntityStore::new());
    let missing = store.add_user("Dana Reyes", "dana@example.org");
    let partial = store.add_user("Noa Lindberg", "noa@example.org");
    store.add_location("Northside Clinic");
    let location_b = store.add_location("Lakeview Center");
    store.add_assignment(partial, location_b, true, AssignmentStatus::Active);

    let engine = engine(store.clone());
    engine.reconcile(ReconcileOptions::default()).await.unwrap();

    for user in [missing, partial] {
        let status = engine.get_unified_status(user).await.unwrap();
        assert_eq!(status.state, AssignmentState::Complete);
        let assignment = status.primary_assignment.unwrap();
        let provider = status.provider.unwrap();
        assert_eq!(assignment.location_id, provider.primary_location_id);
    }
}

#[tokio::test]
async fn test_missing_provider_is_created_at_primary_location() {
    let store = Arc::new(InMemoryEntityStore::new());
    let user = store.add_user("Dana Reyes", "dana@example.org");
    let location = store.add_location("Northside Clinic");
    store.add_assignment(user, location, true, AssignmentStatus::Active);

    let engine = engine(store.clone());
    let result = engine.reconcile(ReconcileOptions::default()).await.unwrap();

    assert_eq!(result.fixed_assignments, 0);
    assert_eq!(result.fixed_providers, 1);
    let provider = store.get_provider_record(user).await.unwrap().unwrap();
    assert_eq!(provider.primary_location_id, location);
}

#[tokio::test]
async fn test_missing_assignment_is_created_at_provider_location() {
    let store = Arc::new(InMemoryEntityStore::new());
    let user = store.add_user("Dana Reyes", "dana@example.org");
    let location = store.add_location("Northside Clinic");
    store.add_provider_record(user, location, ProviderStatus::Approved);

    let engine = engine(store.clone());
    let result = engine.reconcile(ReconcileOptions::default()).await.unwrap();

    assert_eq!(result.fixed_assignments, 1);
    assert_eq!(result.fixed_providers, 0);
    let assignments = store.get_assignments(user).await.unwrap();
    assert_eq!(assignments.len(), 1);
    assert_eq!(assignments[0].location_id, location);
    assert!(assignments[0].is_primary);

    let status = engine.get_unified_status(user).await.unwrap();
    assert_eq!(status.state, AssignmentState::Complete);
}

#[tokio::test]
async fn test_assignment_creation_never_regresses_to_missing() {
    let store = Arc::new(InMemoryEntityStore::new());
    let user = store.add_user("Dana Reyes", "dana@example.org");
    let location = store.add_location("Northside Clinic");

    let engine = engine(store.clone());
    let before = engine.get_unified_status(user).await.unwrap();
    assert_eq!(before.state, AssignmentState::Missing);

    store
        .create_assignment(
            user,
            location,
            true,
            engine_core::domains::assignments::models::AssignmentRole::Provider,
        )
        .await
        .unwrap();

    let after = engine.get_unified_status(user).await.unwrap();
    assert_ne!(after.state, AssignmentState::Missing);
    assert!(matches!(
        after.state,
        AssignmentState::Partial | AssignmentState::Complete
    ));
}

#[tokio::test]
async fn test_no_available_location_leaves_user_missing() {
    let store = Arc::new(InMemoryEntityStore::new());
    let user = store.add_user("Dana Reyes", "dana@example.org");

    let engine = engine(store.clone());
    let result = engine.reconcile(ReconcileOptions::default()).await.unwrap();

    assert_eq!(result.total_fixes(), 0);
    assert!(result
        .errors
        .iter()
        .any(|e| e.message.contains("no available location")));
    let status = engine.get_unified_status(user).await.unwrap();
    assert_eq!(status.state, AssignmentState::Missing);
}

#[tokio::test]
async fn test_dry_run_counts_without_writing() {
    let store = Arc::new(InMemoryEntityStore::new());
    store.add_user("Dana Reyes", "dana@example.org");
    let location = store.add_location("Northside Clinic");
    store.add_team("Cohort 12", Some(location), None, 5);

    let engine = engine(store.clone());
    let planned = engine
        .reconcile(ReconcileOptions {
            dry_run: true,
            deadline: None,
        })
        .await
        .unwrap();

    assert!(planned.dry_run);
    assert_eq!(planned.fixed_assignments, 1);
    assert_eq!(planned.fixed_providers, 1);
    assert_eq!(planned.fixed_teams, 1);
    assert_eq!(store.write_count(), 0);

    // The real run performs exactly what the dry run planned.
    let applied = engine.reconcile(ReconcileOptions::default()).await.unwrap();
    assert_eq!(applied.fixed_assignments, planned.fixed_assignments);
    assert_eq!(applied.fixed_providers, planned.fixed_providers);
    assert_eq!(applied.fixed_teams, planned.fixed_teams);
    assert_eq!(store.write_count(), 3);
}

#[tokio::test]
async fn test_multiple_primaries_are_reported_not_repaired() {
    let store = Arc::new(InMemoryEntityStore::new());
    let user = store.add_user("Dana Reyes", "dana@example.org");
    let location_a = store.add_location("Northside Clinic");
    let location_b = store.add_location("Lakeview Center");
    store.add_assignment(user, location_a, true, AssignmentStatus::Active);
    store.add_assignment(user, location_b, true, AssignmentStatus::Active);

    let engine = engine(store.clone());
    let writes_before = store.write_count();
    let result = engine.reconcile(ReconcileOptions::default()).await.unwrap();

    assert_eq!(result.total_fixes(), 0);
    assert_eq!(result.unresolved_conflicts, 1);
    assert_eq!(store.write_count(), writes_before);
}

#[tokio::test]
async fn test_unflagged_assignments_are_left_to_humans() {
    // Active assignments exist but none is primary; promotion would be an
    // arbitrary choice, so the user stays partial.
    let store = Arc::new(InMemoryEntityStore::new());
    let user = store.add_user("Dana Reyes", "dana@example.org");
    let location = store.add_location("Northside Clinic");
    store.add_assignment(user, location, false, AssignmentStatus::Active);

    let engine = engine(store.clone());
    let result = engine.reconcile(ReconcileOptions::default()).await.unwrap();

    assert_eq!(result.total_fixes(), 0);
    let status = engine.get_unified_status(user).await.unwrap();
    assert_eq!(status.state, AssignmentState::Partial);
}

#[tokio::test]
async fn test_inactive_provider_record_blocks_auto_sync() {
    // One record per user: an inactive record is surfaced, not overwritten.
    let store = Arc::new(InMemoryEntityStore::new());
    let user = store.add_user("Dana Reyes", "dana@example.org");
    let location = store.add_location("Northside Clinic");
    store.add_assignment(user, location, true, AssignmentStatus::Active);
    store.add_provider_record(user, location, ProviderStatus::Inactive);

    let engine = engine(store.clone());
    let writes_before = store.write_count();
    let result = engine.reconcile(ReconcileOptions::default()).await.unwrap();

    assert_eq!(result.total_fixes(), 0);
    assert_eq!(store.write_count(), writes_before);
    let status = engine.get_unified_status(user).await.unwrap();
    assert_eq!(status.state, AssignmentState::Partial);
}

#[tokio::test]
async fn test_self_managed_team_is_not_linked() {
    let store = Arc::new(InMemoryEntityStore::new());
    let user = store.add_user("Dana Reyes", "dana@example.org");
    let location = store.add_location("Northside Clinic");
    store.add_assignment(user, location, true, AssignmentStatus::Active);
    store.add_provider_record(user, location, ProviderStatus::Approved);
    let team = store.add_team("Cohort 12", Some(location), None, 5);
    store.mark_team_self_managed(team);

    let engine = engine(store.clone());
    let result = engine.reconcile(ReconcileOptions::default()).await.unwrap();

    assert_eq!(result.fixed_teams, 0);
    assert_eq!(store.team(team).unwrap().provider_id, None);
}

#[tokio::test]
async fn test_selection_strategy_is_pluggable() {
    use engine_core::domains::assignments::models::{ApUser, Location};
    use engine_core::domains::reconciliation::{
        LocationSelectionStrategy, ReconciliationEngine,
    };

    struct PreferLakeview;

    impl LocationSelectionStrategy for PreferLakeview {
        fn select<'a>(&self, _user: &ApUser, candidates: &'a [Location]) -> Option<&'a Location> {
            candidates
                .iter()
                .find(|l| l.name == "Lakeview Center")
                .or_else(|| candidates.first())
        }
    }

    let store = Arc::new(InMemoryEntityStore::new());
    let user = store.add_user("Dana Reyes", "dana@example.org");
    store.add_location("Northside Clinic");
    let lakeview = store.add_location("Lakeview Center");

    let engine = ReconciliationEngine::new(store.clone(), common::test_settings())
        .with_strategy(Arc::new(PreferLakeview));
    engine.reconcile(ReconcileOptions::default()).await.unwrap();

    let assignments = store.get_assignments(user).await.unwrap();
    assert_eq!(assignments[0].location_id, lakeview);
}

#[tokio::test]
async fn test_store_failure_on_one_entity_does_not_abort_the_batch() {
    // A partial user whose primary location was deleted cannot be repaired
    // (the provider write fails), but other users still get fixed.
    let store = Arc::new(InMemoryEntityStore::new());
    let broken = store.add_user("Dana Reyes", "dana@example.org");
    let fixable = store.add_user("Noa Lindberg", "noa@example.org");
    let gone = store.add_location("Closed Annex");
    store.add_location("Northside Clinic");
    store.add_assignment(broken, gone, true, AssignmentStatus::Active);
    store.remove_location(gone);

    let engine = engine(store.clone());
    let result = engine.reconcile(ReconcileOptions::default()).await.unwrap();

    assert!(result.errors.iter().any(|e| e.entity.contains(&broken.to_string())));
    // The healthy user was still provisioned.
    let status = engine.get_unified_status(fixable).await.unwrap();
    assert_eq!(status.state, AssignmentState::Complete);
}
