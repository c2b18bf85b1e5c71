//! Closest-bus selection for a passenger's reference stop.

use bustrack_transit::{BusIdentifier, Route, Stop, StopId, haversine_distance_km};
use serde::{Deserialize, Serialize};

use crate::registry::{BusRegistry, BusState};

/// What the passenger told us about where they wait
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitingState {
    pub stop_id: Option<StopId>,
    pub waiting: bool,
}

impl WaitingState {
    pub fn at(stop_id: StopId) -> Self {
        Self {
            stop_id: Some(stop_id),
            waiting: true,
        }
    }
}

/// The passenger's selected stop when it exists on the route, else the first stop.
pub fn reference_stop<'r>(route: &'r Route, waiting: &WaitingState) -> &'r Stop {
    waiting
        .stop_id
        .and_then(|id| route.stop(id))
        .unwrap_or_else(|| route.first_stop())
}

#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub bus_id: BusIdentifier,
    /// Haversine distance from the bus to the reference stop
    pub distance_km: f64,
}

/// Buses a passenger may be shown: everything not reported full.
pub fn eligible(registry: &BusRegistry) -> impl Iterator<Item = &BusState> {
    registry.all().into_iter().filter(|bus| !bus.is_full)
}

/// The non-full bus nearest to `reference`, or `None` when no bus qualifies.
///
/// Equidistant buses resolve to the one registered first.
pub fn closest_bus(registry: &BusRegistry, reference: &Stop) -> Option<Candidate> {
    eligible(registry)
        .map(|bus| Candidate {
            bus_id: bus.bus_id.clone(),
            distance_km: haversine_distance_km(reference.location, bus.location),
        })
        .min_by(|a, b| a.distance_km.total_cmp(&b.distance_km))
}
