use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::{ApUserId, AssignmentId, LocationId};

/// Role an AP user holds at an assigned location.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentRole {
    Provider,
    Supervisor,
    Coordinator,
}

impl std::fmt::Display for AssignmentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssignmentRole::Provider => write!(f, "provider"),
            AssignmentRole::Supervisor => write!(f, "supervisor"),
            AssignmentRole::Coordinator => write!(f, "coordinator"),
        }
    }
}

impl std::str::FromStr for AssignmentRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "provider" => Ok(AssignmentRole::Provider),
            "supervisor" => Ok(AssignmentRole::Supervisor),
            "coordinator" => Ok(AssignmentRole::Coordinator),
            _ => Err(anyhow::anyhow!("Invalid assignment role: {}", s)),
        }
    }
}

/// Lifecycle status of a location assignment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Active,
    Inactive,
}

impl std::fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssignmentStatus::Active => write!(f, "active"),
            AssignmentStatus::Inactive => write!(f, "inactive"),
        }
    }
}

impl std::str::FromStr for AssignmentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(AssignmentStatus::Active),
            "inactive" => Ok(AssignmentStatus::Inactive),
            _ => Err(anyhow::anyhow!("Invalid assignment status: {}", s)),
        }
    }
}

/// A link between one AP user and one location.
///
/// At most one active assignment per user carries `is_primary = true`; that
/// one is the authoritative source for the user's provider record sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationAssignment {
    pub id: AssignmentId,
    pub ap_user_id: ApUserId,
    pub location_id: LocationId,
    pub location_name: String,
    pub is_primary: bool,
    pub role: AssignmentRole,
    pub status: AssignmentStatus,
    pub assigned_at: DateTime<Utc>,
}

impl LocationAssignment {
    /// Whether this assignment currently counts toward the user's state.
    pub fn is_active(&self) -> bool {
        self.status == AssignmentStatus::Active
    }

    /// Whether this is the user's authoritative assignment.
    pub fn is_active_primary(&self) -> bool {
        self.is_active() && self.is_primary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_roundtrip() {
        for role in [
            AssignmentRole::Provider,
            AssignmentRole::Supervisor,
            AssignmentRole::Coordinator,
        ] {
            let parsed: AssignmentRole = role.to_string().parse().unwrap();
            assert_eq!(parsed, role);
        }
    }

    #[test]
    fn test_status_rejects_unknown_value() {
        assert!("retired".parse::<AssignmentStatus>().is_err());
    }
}
