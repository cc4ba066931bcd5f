pub mod ap_user;
pub mod location;
pub mod location_assignment;
pub mod provider_record;

pub use ap_user::ApUser;
pub use location::Location;
pub use location_assignment::{AssignmentRole, AssignmentStatus, LocationAssignment};
pub use provider_record::{ProviderRecord, ProviderStatus};
