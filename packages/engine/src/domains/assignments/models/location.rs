use serde::{Deserialize, Serialize};

use crate::common::LocationId;

/// A training location an AP user can be assigned to manage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
}
