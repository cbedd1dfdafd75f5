//! Picks the buildings that matter for the current pose.
//!
//! Every call is a full linear scan over the [`BuildingSet`]; nothing is
//! cached between poses. Selected buildings keep their dataset order.

use crate::building::{Building, BuildingSet};
use crate::geo::{bearing_deg, circular_diff_deg, haversine_km, Degree};
use crate::pose::Pose;
use serde::{Deserialize, Serialize};

/// Which buildings count as relevant.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FilterPolicy {
    /// Buildings further than this are ignored
    pub radius_km: f64,
    /// Also require the building to be roughly in front of the user
    pub directional: bool,
    /// How far either side of the heading still counts as "in front"
    pub cone_half_width_deg: Degree,
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self {
            radius_km: 8.0,
            directional: false,
            cone_half_width_deg: 45.0,
        }
    }
}

/// A selected building, with where it is relative to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredBuilding {
    /// The building itself
    pub building: Building,
    /// Great-circle distance from the user
    pub distance_km: f64,
    /// Compass bearing from the user, in [0, 360)
    pub bearing_deg: Degree,
}

/// Measures every building against `pose` and keeps the ones `policy`
/// selects.
///
/// When the policy is directional but the pose has no heading, the cone test
/// passes everything and only the radius applies.
pub fn apply(pose: &Pose, buildings: &BuildingSet, policy: &FilterPolicy) -> Vec<FilteredBuilding> {
    let user = pose.position.coordinate;
    let heading = pose.heading.filter(|_| policy.directional).map(|h| h.degrees());

    buildings
        .iter()
        .filter_map(|building| {
            let at = building.location()?;
            let distance_km = haversine_km(user, at);
            if distance_km > policy.radius_km {
                return None;
            }

            let bearing_deg = bearing_deg(user, at);
            if let Some(heading) = heading {
                if circular_diff_deg(bearing_deg, heading) > policy.cone_half_width_deg {
                    return None;
                }
            }

            Some(FilteredBuilding {
                building: building.clone(),
                distance_km,
                bearing_deg,
            })
        })
        .collect()
}
