use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::common::{LocationId, ProviderRecordId, TeamId};

/// Team lifecycle status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TeamStatus {
    Active,
    Inactive,
}

impl std::fmt::Display for TeamStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TeamStatus::Active => write!(f, "active"),
            TeamStatus::Inactive => write!(f, "inactive"),
        }
    }
}

impl std::str::FromStr for TeamStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(TeamStatus::Active),
            "inactive" => Ok(TeamStatus::Inactive),
            _ => Err(anyhow::anyhow!("Invalid team status: {}", s)),
        }
    }
}

/// A training team owned by a location and optionally managed by a provider.
///
/// `member_count` is maintained by the membership system; the engine treats
/// it as an input. `self_managed` is an explicit administrator decision, it
/// is never inferred.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub location_id: Option<LocationId>,
    pub provider_id: Option<ProviderRecordId>,
    pub member_count: i32,
    pub status: TeamStatus,
    pub self_managed: bool,
}

impl Team {
    pub fn is_active(&self) -> bool {
        self.status == TeamStatus::Active
    }

    pub fn has_members(&self) -> bool {
        self.member_count > 0
    }

    /// Whether this team should be managed by a provider but currently is not.
    pub fn needs_provider(&self) -> bool {
        self.provider_id.is_none()
            && self.has_members()
            && !self.self_managed
            && self.location_id.is_some()
    }
}
