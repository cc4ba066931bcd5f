// Health domain: system-wide scoring over analyzer and auditor output.

pub mod report;

pub use report::{
    generate_report, HealthSummary, SystemHealthReport, SystemIssue, TeamSummary, UserSummary,
};
