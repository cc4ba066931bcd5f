//! Candidate-location selection for unassigned AP users.
//!
//! No documented business rule governs which open location an unassigned
//! user should receive, so the policy is pluggable. The default takes the
//! first candidate the store returns; operators can substitute a
//! load-balancing or geography-aware policy without touching the repair
//! path.

use crate::domains::assignments::models::{ApUser, Location};

/// Picks the location an unassigned AP user should be assigned to.
pub trait LocationSelectionStrategy: Send + Sync {
    /// Select from locations that currently have no active primary
    /// assignment. Returning `None` means no acceptable candidate exists.
    fn select<'a>(&self, user: &ApUser, candidates: &'a [Location]) -> Option<&'a Location>;
}

/// Default policy: the first available location.
pub struct FirstAvailable;

impl LocationSelectionStrategy for FirstAvailable {
    fn select<'a>(&self, _user: &ApUser, candidates: &'a [Location]) -> Option<&'a Location> {
        candidates.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ApUserId, LocationId};

    fn user() -> ApUser {
        ApUser {
            id: ApUserId::new(),
            display_name: "Dana Reyes".to_string(),
            email: "dana@example.org".to_string(),
        }
    }

    #[test]
    fn test_first_available_takes_head_of_list() {
        let candidates = vec![
            Location {
                id: LocationId::new(),
                name: "Northside Clinic".to_string(),
            },
            Location {
                id: LocationId::new(),
                name: "Lakeview Center".to_string(),
            },
        ];
        let picked = FirstAvailable.select(&user(), &candidates).unwrap();
        assert_eq!(picked.id, candidates[0].id);
    }

    #[test]
    fn test_no_candidates_yields_none() {
        assert!(FirstAvailable.select(&user(), &[]).is_none());
    }
}
