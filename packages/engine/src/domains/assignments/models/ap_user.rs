use serde::{Deserialize, Serialize};

use crate::common::ApUserId;

/// An authorized-provider user, as projected from the identity system.
///
/// AP users are created and destroyed upstream; the engine only ever reads
/// them. Everything the engine derives about a user (assignment state,
/// provider sync state) is recomputed from the store, never persisted here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApUser {
    pub id: ApUserId,
    pub display_name: String,
    pub email: String,
}
