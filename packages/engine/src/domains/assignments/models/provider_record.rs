use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::common::{ApUserId, LocationId, ProviderRecordId};

/// Provider record status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Approved,
    Inactive,
}

impl std::fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderStatus::Approved => write!(f, "approved"),
            ProviderStatus::Inactive => write!(f, "inactive"),
        }
    }
}

impl std::str::FromStr for ProviderStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "approved" => Ok(ProviderStatus::Approved),
            "inactive" => Ok(ProviderStatus::Inactive),
            _ => Err(anyhow::anyhow!("Invalid provider status: {}", s)),
        }
    }
}

/// The business-entity projection of an AP user as an authorized provider.
///
/// Exactly zero or one record exists per AP user. `primary_location_id` must
/// mirror the user's primary location assignment; when the two disagree the
/// user is in conflict and nothing here may be rewritten automatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRecord {
    pub id: ProviderRecordId,
    pub ap_user_id: ApUserId,
    pub status: ProviderStatus,
    pub primary_location_id: LocationId,
    pub primary_location_name: String,
    /// True when the record was created and is maintained by the engine
    /// rather than entered by a human administrator.
    pub auto_synced: bool,
}

impl ProviderRecord {
    pub fn is_approved(&self) -> bool {
        self.status == ProviderStatus::Approved
    }
}
