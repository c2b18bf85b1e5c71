//! Core traits for route data.
//!
//! These traits define the public interface for route data.
//! Implementations can be in-memory, database-backed, or remote.

use geo::Point;
use std::sync::Arc;

use crate::identifiers::*;
use crate::models::types::*;

/// Provider of route and stop data with lookup and proximity queries
pub trait RouteProvider: Send + Sync {
    // ---- Lookups ----
    fn route(&self, id: &RouteIdentifier) -> Option<Arc<Route>>;

    /// Ordered stops of a route (forward direction)
    fn route_stops(&self, id: &RouteIdentifier) -> Result<Vec<Stop>> {
        self.route(id)
            .map(|route| route.stops().to_vec())
            .ok_or_else(|| TransitError::RouteNotFound(id.clone()))
    }

    // ---- Collections ----
    fn all_routes(&self) -> Vec<Arc<Route>>;

    // ---- Spatial queries ----

    /// Stops of a route within radius (km), in route order
    fn stops_within(&self, id: &RouteIdentifier, point: Point, radius_km: f64) -> Vec<Stop>;

    /// Nearest stop of a route and its distance (km)
    fn nearest_stop(&self, id: &RouteIdentifier, point: Point) -> Option<(Stop, f64)> {
        let route = self.route(id)?;
        let (_, stop, km) = route.nearest_stop(point);
        Some((stop.clone(), km))
    }
}
