//! Road distances between stops, built from measured segment lengths.
//!
//! A route of `n` stops has `n - 1` segments. The forward distance of a stop
//! is the sum of the segments before it; the backward distance is measured
//! from the last stop, so it is `total - forward`.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bustrack_transit::{
    BusIdentifier, Direction, Route, RouteIdentifier, StopId, TransitError, WaypointDistance,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::progress::clamp_progress;
use crate::registry::BusRegistry;

type TransitResult<T> = bustrack_transit::Result<T>;

#[derive(Clone, Debug, PartialEq)]
struct RouteDistances {
    forward: HashMap<StopId, f64>,
    total_km: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StopStatus {
    /// The stop is still in front of the bus
    Ahead,
    Passed,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct RemainingDistance {
    /// Never negative; a passed stop is 0 km away
    pub km: f64,
    pub status: StopStatus,
}

#[derive(Clone, Debug, Default)]
pub struct StopDistanceTable {
    routes: HashMap<RouteIdentifier, RouteDistances>,
}

impl StopDistanceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the segment lengths of `route`, replacing any previous table.
    pub fn insert(&mut self, route: &Route, segments: &[f64]) -> TransitResult<()> {
        let expected = route.len() - 1;
        if segments.len() != expected {
            return Err(TransitError::InvalidData(format!(
                "route {} has {} stops and needs {expected} segments, got {}",
                route.id(),
                route.len(),
                segments.len()
            )));
        }
        if let Some(bad) = segments.iter().find(|km| !km.is_finite() || **km < 0.0) {
            return Err(TransitError::InvalidData(format!(
                "route {} has an invalid segment length {bad}",
                route.id()
            )));
        }

        let mut forward = HashMap::with_capacity(route.len());
        let mut cumulative = 0.0;
        for (i, stop) in route.stops().iter().enumerate() {
            if i > 0 {
                cumulative += segments[i - 1];
            }
            forward.insert(stop.id, cumulative);
        }

        info!(route = %route.id(), total_km = cumulative, "stop distances loaded");
        self.routes.insert(
            route.id().clone(),
            RouteDistances {
                forward,
                total_km: cumulative,
            },
        );
        Ok(())
    }

    pub fn contains(&self, route_id: &RouteIdentifier) -> bool {
        self.routes.contains_key(route_id)
    }

    pub fn total_km(&self, route_id: &RouteIdentifier) -> Option<f64> {
        self.routes.get(route_id).map(|route| route.total_km)
    }

    /// Distance of `stop` from the start of a trip in `direction`
    pub fn stop_distance(
        &self,
        route_id: &RouteIdentifier,
        stop: StopId,
        direction: Direction,
    ) -> TransitResult<f64> {
        let route = self
            .routes
            .get(route_id)
            .ok_or_else(|| TransitError::RouteNotFound(route_id.clone()))?;
        let forward = route
            .forward
            .get(&stop)
            .copied()
            .ok_or_else(|| TransitError::StopNotFound {
                route: route_id.clone(),
                stop,
            })?;

        Ok(match direction {
            Direction::Forward => forward,
            Direction::Backward => route.total_km - forward,
        })
    }

    /// Road distance left between a bus and `stop`.
    ///
    /// `bus_distance_km` is how far the bus has travelled since the start of
    /// its trip, as reported upstream.
    pub fn remaining(
        &self,
        route_id: &RouteIdentifier,
        stop: StopId,
        direction: Direction,
        bus_distance_km: f64,
    ) -> TransitResult<RemainingDistance> {
        let stop_km = self.stop_distance(route_id, stop, direction)?;
        let remaining = stop_km - bus_distance_km;

        Ok(if remaining > 0.0 {
            RemainingDistance {
                km: remaining,
                status: StopStatus::Ahead,
            }
        } else {
            RemainingDistance {
                km: 0.0,
                status: StopStatus::Passed,
            }
        })
    }

    /// Share of the route covered after `distance_km`, within [0, 100]
    pub fn progress_pct(&self, route_id: &RouteIdentifier, distance_km: f64) -> Option<f64> {
        let total = self.total_km(route_id).filter(|total| *total > 0.0)?;
        Some(clamp_progress(distance_km / total * 100.0))
    }
}

/// Authoritative distances answered from a [`StopDistanceTable`].
///
/// Captures each bus's reported distance from start at construction, so a
/// lookup reflects the registry as it was when the selection ran.
#[derive(Clone, Debug)]
pub struct TableWaypoints {
    table: Arc<StopDistanceTable>,
    buses: HashMap<BusIdentifier, (f64, Direction)>,
}

impl TableWaypoints {
    pub fn new(table: Arc<StopDistanceTable>, registry: &BusRegistry) -> Self {
        let buses = registry
            .all()
            .into_iter()
            .filter_map(|bus| {
                let km = bus.distance_from_start_km?;
                Some((bus.bus_id.clone(), (km, bus.direction)))
            })
            .collect();

        Self { table, buses }
    }

    fn lookup(
        &self,
        route_id: &RouteIdentifier,
        bus_id: &BusIdentifier,
        stop_id: StopId,
    ) -> TransitResult<f64> {
        let (bus_km, direction) = self
            .buses
            .get(bus_id)
            .copied()
            .ok_or_else(|| TransitError::BusNotFound(bus_id.clone()))?;

        let remaining = self.table.remaining(route_id, stop_id, direction, bus_km)?;
        debug!(bus = %bus_id, stop = %stop_id, km = remaining.km, status = ?remaining.status, "table distance");
        Ok(remaining.km)
    }
}

impl WaypointDistance for TableWaypoints {
    fn waypoint_distance<'a>(
        &'a self,
        route_id: &'a RouteIdentifier,
        bus_id: &'a BusIdentifier,
        stop_id: StopId,
    ) -> Pin<Box<dyn Future<Output = TransitResult<f64>> + Send + 'a>> {
        Box::pin(async move { self.lookup(route_id, bus_id, stop_id) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use bustrack_transit::{BusReport, Stop};
    use chrono::Utc;

    fn route() -> Route {
        Route::new(
            RouteIdentifier::new("23"),
            "Thirupallai - Periyar",
            vec![
                Stop::new(1, "Thirupallai", 9.972, 78.138),
                Stop::new(2, "Iyer Bungalow", 9.955, 78.132),
                Stop::new(3, "Goripalayam", 9.931, 78.126),
                Stop::new(4, "Periyar", 9.916, 78.114),
            ],
        )
        .unwrap()
    }

    fn table() -> StopDistanceTable {
        let mut table = StopDistanceTable::new();
        table.insert(&route(), &[1.5, 2.0, 2.5]).unwrap();
        table
    }

    #[test]
    fn test_cumulative_forward_and_backward() {
        let table = table();
        let id = RouteIdentifier::new("23");

        assert_relative_eq!(table.total_km(&id).unwrap(), 6.0);
        assert_relative_eq!(table.stop_distance(&id, StopId(1), Direction::Forward).unwrap(), 0.0);
        assert_relative_eq!(table.stop_distance(&id, StopId(3), Direction::Forward).unwrap(), 3.5);
        assert_relative_eq!(table.stop_distance(&id, StopId(3), Direction::Backward).unwrap(), 2.5);
        assert_relative_eq!(table.stop_distance(&id, StopId(4), Direction::Backward).unwrap(), 0.0);
    }

    #[test]
    fn test_segment_count_must_match() {
        let mut table = StopDistanceTable::new();
        assert!(matches!(
            table.insert(&route(), &[1.0, 2.0]),
            Err(TransitError::InvalidData(_))
        ));
        assert!(table.insert(&route(), &[1.0, -2.0, 1.0]).is_err());
        assert!(table.insert(&route(), &[1.0, f64::NAN, 1.0]).is_err());
        assert!(!table.contains(&RouteIdentifier::new("23")));
    }

    #[test]
    fn test_unknown_stop_and_route() {
        let table = table();
        assert!(matches!(
            table.stop_distance(&RouteIdentifier::new("23"), StopId(9), Direction::Forward),
            Err(TransitError::StopNotFound { .. })
        ));
        assert!(matches!(
            table.stop_distance(&RouteIdentifier::new("48"), StopId(1), Direction::Forward),
            Err(TransitError::RouteNotFound(_))
        ));
    }

    #[test]
    fn test_remaining_ahead_and_passed() {
        let table = table();
        let id = RouteIdentifier::new("23");

        let ahead = table.remaining(&id, StopId(3), Direction::Forward, 1.0).unwrap();
        assert_eq!(ahead.status, StopStatus::Ahead);
        assert_relative_eq!(ahead.km, 2.5);

        let passed = table.remaining(&id, StopId(2), Direction::Forward, 2.0).unwrap();
        assert_eq!(passed.status, StopStatus::Passed);
        assert_eq!(passed.km, 0.0);

        // Coming back from Periyar, Iyer Bungalow is 4.5 km into the trip
        let back = table.remaining(&id, StopId(2), Direction::Backward, 3.0).unwrap();
        assert_eq!(back.status, StopStatus::Ahead);
        assert_relative_eq!(back.km, 1.5);
    }

    #[test]
    fn test_progress_pct() {
        let table = table();
        let id = RouteIdentifier::new("23");

        assert_relative_eq!(table.progress_pct(&id, 3.0).unwrap(), 50.0);
        assert_eq!(table.progress_pct(&id, 9.0), Some(100.0));
        assert_eq!(table.progress_pct(&RouteIdentifier::new("48"), 1.0), None);
    }

    #[tokio::test]
    async fn test_table_waypoints() {
        let mut registry = BusRegistry::new(RouteIdentifier::new("23"), 50);
        let mut report = BusReport::located("A", 9.96, 78.13);
        report.distance_from_start = Some(1.0);
        registry.upsert(report, Utc::now()).unwrap();
        registry.upsert(BusReport::located("B", 9.95, 78.13), Utc::now()).unwrap();

        let waypoints = TableWaypoints::new(Arc::new(table()), &registry);
        let route_id = RouteIdentifier::new("23");

        let km = waypoints
            .waypoint_distance(&route_id, &"A".into(), StopId(4))
            .await
            .unwrap();
        assert_relative_eq!(km, 5.0);

        // B never reported a distance from start
        let missing = waypoints.waypoint_distance(&route_id, &"B".into(), StopId(4)).await;
        assert!(matches!(missing, Err(TransitError::BusNotFound(_))));
    }
}
