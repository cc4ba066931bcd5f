// Team domain: location-owned teams and their provider linkage.

pub mod auditor;
pub mod models;

pub use auditor::{audit_team, TeamAudit};
pub use models::{Team, TeamStatus};
