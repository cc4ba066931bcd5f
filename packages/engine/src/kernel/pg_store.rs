// PgEntityStore - Postgres implementation of the store contract
//
// Runs against the platform's existing tables; schema management lives with
// the application layer. Rows are decoded into loosely-typed row structs and
// mapped into the domain models so that enum values are validated at the
// boundary rather than scattered through the engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::common::{ApUserId, AssignmentId, LocationId, ProviderRecordId, TeamId};
use crate::domains::assignments::models::{
    ApUser, AssignmentRole, Location, LocationAssignment, ProviderRecord,
};
use crate::domains::teams::models::Team;

use super::traits::{BaseEntityStore, StoreError};

/// Postgres-backed entity store.
#[derive(Clone)]
pub struct PgEntityStore {
    pool: PgPool,
}

impl PgEntityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Row types
// ============================================================================

#[derive(sqlx::FromRow)]
struct ApUserRow {
    id: Uuid,
    display_name: String,
    email: String,
}

impl From<ApUserRow> for ApUser {
    fn from(row: ApUserRow) -> Self {
        Self {
            id: ApUserId::from_uuid(row.id),
            display_name: row.display_name,
            email: row.email,
        }
    }
}

#[derive(sqlx::FromRow)]
struct LocationRow {
    id: Uuid,
    name: String,
}

impl From<LocationRow> for Location {
    fn from(row: LocationRow) -> Self {
        Self {
            id: LocationId::from_uuid(row.id),
            name: row.name,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AssignmentRow {
    id: Uuid,
    ap_user_id: Uuid,
    location_id: Uuid,
    location_name: String,
    is_primary: bool,
    role: String,
    status: String,
    assigned_at: DateTime<Utc>,
}

impl TryFrom<AssignmentRow> for LocationAssignment {
    type Error = StoreError;

    fn try_from(row: AssignmentRow) -> Result<Self, StoreError> {
        Ok(Self {
            id: AssignmentId::from_uuid(row.id),
            ap_user_id: ApUserId::from_uuid(row.ap_user_id),
            location_id: LocationId::from_uuid(row.location_id),
            location_name: row.location_name,
            is_primary: row.is_primary,
            role: row
                .role
                .parse()
                .map_err(|e: anyhow::Error| StoreError::Decode(e.to_string()))?,
            status: row
                .status
                .parse()
                .map_err(|e: anyhow::Error| StoreError::Decode(e.to_string()))?,
            assigned_at: row.assigned_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProviderRecordRow {
    id: Uuid,
    ap_user_id: Uuid,
    status: String,
    primary_location_id: Uuid,
    primary_location_name: String,
    auto_synced: bool,
}

impl TryFrom<ProviderRecordRow> for ProviderRecord {
    type Error = StoreError;

    fn try_from(row: ProviderRecordRow) -> Result<Self, StoreError> {
        Ok(Self {
            id: ProviderRecordId::from_uuid(row.id),
            ap_user_id: ApUserId::from_uuid(row.ap_user_id),
            status: row
                .status
                .parse()
                .map_err(|e: anyhow::Error| StoreError::Decode(e.to_string()))?,
            primary_location_id: LocationId::from_uuid(row.primary_location_id),
            primary_location_name: row.primary_location_name,
            auto_synced: row.auto_synced,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TeamRow {
    id: Uuid,
    name: String,
    location_id: Option<Uuid>,
    provider_id: Option<Uuid>,
    member_count: i32,
    status: String,
    self_managed: bool,
}

impl TryFrom<TeamRow> for Team {
    type Error = StoreError;

    fn try_from(row: TeamRow) -> Result<Self, StoreError> {
        Ok(Self {
            id: TeamId::from_uuid(row.id),
            name: row.name,
            location_id: row.location_id.map(LocationId::from_uuid),
            provider_id: row.provider_id.map(ProviderRecordId::from_uuid),
            member_count: row.member_count,
            status: row
                .status
                .parse()
                .map_err(|e: anyhow::Error| StoreError::Decode(e.to_string()))?,
            self_managed: row.self_managed,
        })
    }
}

fn map_unique_violation(err: sqlx::Error, what: String) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::AlreadyExists(what),
        _ => StoreError::Database(err),
    }
}

// ============================================================================
// Contract implementation
// ============================================================================

#[async_trait]
impl BaseEntityStore for PgEntityStore {
    async fn list_ap_users(&self) -> Result<Vec<ApUser>, StoreError> {
        let rows = sqlx::query_as::<_, ApUserRow>(
            "SELECT id, display_name, email FROM ap_users ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ApUser::from).collect())
    }

    async fn get_ap_user(&self, ap_user_id: ApUserId) -> Result<Option<ApUser>, StoreError> {
        let row = sqlx::query_as::<_, ApUserRow>(
            "SELECT id, display_name, email FROM ap_users WHERE id = $1",
        )
        .bind(ap_user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ApUser::from))
    }

    async fn get_assignments(
        &self,
        ap_user_id: ApUserId,
    ) -> Result<Vec<LocationAssignment>, StoreError> {
        let rows = sqlx::query_as::<_, AssignmentRow>(
            r#"
            SELECT id, ap_user_id, location_id, location_name, is_primary, role, status, assigned_at
            FROM location_assignments
            WHERE ap_user_id = $1
            ORDER BY assigned_at
            "#,
        )
        .bind(ap_user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(LocationAssignment::try_from).collect()
    }

    async fn get_provider_record(
        &self,
        ap_user_id: ApUserId,
    ) -> Result<Option<ProviderRecord>, StoreError> {
        let row = sqlx::query_as::<_, ProviderRecordRow>(
            r#"
            SELECT id, ap_user_id, status, primary_location_id, primary_location_name, auto_synced
            FROM provider_records
            WHERE ap_user_id = $1
            "#,
        )
        .bind(ap_user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ProviderRecord::try_from).transpose()
    }

    async fn get_provider_record_by_id(
        &self,
        provider_id: ProviderRecordId,
    ) -> Result<Option<ProviderRecord>, StoreError> {
        let row = sqlx::query_as::<_, ProviderRecordRow>(
            r#"
            SELECT id, ap_user_id, status, primary_location_id, primary_location_name, auto_synced
            FROM provider_records
            WHERE id = $1
            "#,
        )
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ProviderRecord::try_from).transpose()
    }

    async fn list_locations(&self) -> Result<Vec<Location>, StoreError> {
        let rows =
            sqlx::query_as::<_, LocationRow>("SELECT id, name FROM locations ORDER BY name")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(Location::from).collect())
    }

    async fn list_available_locations(&self) -> Result<Vec<Location>, StoreError> {
        let rows = sqlx::query_as::<_, LocationRow>(
            r#"
            SELECT l.id, l.name
            FROM locations l
            WHERE NOT EXISTS (
                SELECT 1 FROM location_assignments a
                WHERE a.location_id = l.id
                  AND a.is_primary
                  AND a.status = 'active'
            )
            ORDER BY l.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Location::from).collect())
    }

    async fn create_assignment(
        &self,
        ap_user_id: ApUserId,
        location_id: LocationId,
        is_primary: bool,
        role: AssignmentRole,
    ) -> Result<LocationAssignment, StoreError> {
        let location = sqlx::query_as::<_, LocationRow>("SELECT id, name FROM locations WHERE id = $1")
            .bind(location_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("location {}", location_id)))?;

        // The partial unique index on (ap_user_id) for active primary rows
        // turns a lost race into a unique violation.
        let row = sqlx::query_as::<_, AssignmentRow>(
            r#"
            INSERT INTO location_assignments
                (id, ap_user_id, location_id, location_name, is_primary, role, status, assigned_at)
            VALUES ($1, $2, $3, $4, $5, $6, 'active', NOW())
            RETURNING id, ap_user_id, location_id, location_name, is_primary, role, status, assigned_at
            "#,
        )
        .bind(AssignmentId::new())
        .bind(ap_user_id)
        .bind(location_id)
        .bind(&location.name)
        .bind(is_primary)
        .bind(role.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            map_unique_violation(e, format!("active primary assignment for AP user {}", ap_user_id))
        })?;

        LocationAssignment::try_from(row)
    }

    async fn create_provider_record(
        &self,
        ap_user_id: ApUserId,
        primary_location_id: LocationId,
    ) -> Result<ProviderRecord, StoreError> {
        let location = sqlx::query_as::<_, LocationRow>("SELECT id, name FROM locations WHERE id = $1")
            .bind(primary_location_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("location {}", primary_location_id)))?;

        let row = sqlx::query_as::<_, ProviderRecordRow>(
            r#"
            INSERT INTO provider_records
                (id, ap_user_id, status, primary_location_id, primary_location_name, auto_synced)
            VALUES ($1, $2, 'approved', $3, $4, TRUE)
            RETURNING id, ap_user_id, status, primary_location_id, primary_location_name, auto_synced
            "#,
        )
        .bind(ProviderRecordId::new())
        .bind(ap_user_id)
        .bind(primary_location_id)
        .bind(&location.name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, format!("provider record for AP user {}", ap_user_id)))?;

        ProviderRecord::try_from(row)
    }

    async fn list_teams(&self, location_id: Option<LocationId>) -> Result<Vec<Team>, StoreError> {
        let rows = match location_id {
            Some(location_id) => {
                sqlx::query_as::<_, TeamRow>(
                    r#"
                    SELECT id, name, location_id, provider_id, member_count, status, self_managed
                    FROM teams
                    WHERE location_id = $1
                    ORDER BY name
                    "#,
                )
                .bind(location_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, TeamRow>(
                    r#"
                    SELECT id, name, location_id, provider_id, member_count, status, self_managed
                    FROM teams
                    ORDER BY name
                    "#,
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.into_iter().map(Team::try_from).collect()
    }

    async fn set_team_provider(
        &self,
        team_id: TeamId,
        provider_id: ProviderRecordId,
    ) -> Result<(), StoreError> {
        // Compare-and-set: only an unlinked team row is updated.
        let result = sqlx::query(
            "UPDATE teams SET provider_id = $2 WHERE id = $1 AND provider_id IS NULL",
        )
        .bind(team_id)
        .bind(provider_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM teams WHERE id = $1")
            .bind(team_id)
            .fetch_optional(&self.pool)
            .await?;
        match exists {
            Some(_) => Err(StoreError::AlreadyExists(format!(
                "provider link on team {}",
                team_id
            ))),
            None => Err(StoreError::NotFound(format!("team {}", team_id))),
        }
    }
}
