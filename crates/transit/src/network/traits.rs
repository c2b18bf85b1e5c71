//! Pluggable collaborator traits.
//!
//! The transport layer (socket, HTTP polling, routing service) lives outside
//! this workspace. External crates implement these to feed the tracker.

use std::future::Future;
use std::pin::Pin;

use crate::identifiers::*;
use crate::models::types::{BusReport, Result};

/// Polled snapshot of every bus currently active on a route
pub trait BusFeed: Send + Sync {
    fn active_buses<'a>(
        &'a self,
        route_id: &'a RouteIdentifier,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<BusReport>>> + Send + 'a>>;
}

/// Road-network distance from a bus to a stop, in kilometres.
///
/// More accurate than haversine but may fail or time out; callers fall back
/// to the haversine value when it does.
pub trait WaypointDistance: Send + Sync {
    fn waypoint_distance<'a>(
        &'a self,
        route_id: &'a RouteIdentifier,
        bus_id: &'a BusIdentifier,
        stop_id: StopId,
    ) -> Pin<Box<dyn Future<Output = Result<f64>> + Send + 'a>>;
}
