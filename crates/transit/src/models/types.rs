//! Core data types and enums for route data.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use geo::Point;
use serde::{Deserialize, Serialize};

use crate::identifiers::*;
use crate::spatial::queries::haversine_distance_km;

// ============================================================================
// Enums
// ============================================================================

/// Travel direction along a route's stop order.
///
/// Forward runs first stop to last stop, backward runs the reverse.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

impl Direction {
    pub fn reversed(self) -> Self {
        match self {
            Self::Forward => Self::Backward,
            Self::Backward => Self::Forward,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A fixed boarding point on a route.
#[derive(Clone, Debug, PartialEq)]
pub struct Stop {
    pub id: StopId,
    pub name: Arc<str>,
    pub location: Point,
}

impl Stop {
    pub fn new(id: u32, name: impl AsRef<str>, lat: f64, lng: f64) -> Self {
        Self {
            id: StopId(id),
            name: name.as_ref().into(),
            location: Point::new(lng, lat),
        }
    }

    pub fn lat(&self) -> f64 {
        self.location.y()
    }

    pub fn lng(&self) -> f64 {
        self.location.x()
    }
}

impl Serialize for Stop {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("Stop", 4)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("name", &*self.name)?;
        state.serialize_field("lat", &self.lat())?;
        state.serialize_field("lng", &self.lng())?;
        state.end()
    }
}

/// An ordered sequence of stops. The order defines the forward direction.
#[derive(Clone, Debug)]
pub struct Route {
    id: RouteIdentifier,
    name: Arc<str>,
    stops: Vec<Stop>,
}

impl Route {
    /// Build a route, rejecting an empty stop list or duplicated stop ids.
    pub fn new(id: RouteIdentifier, name: impl AsRef<str>, stops: Vec<Stop>) -> Result<Self> {
        if stops.is_empty() {
            return Err(TransitError::InvalidData(format!(
                "route {} has no stops",
                id
            )));
        }

        let mut seen = HashSet::new();
        for stop in &stops {
            if !stop.lat().is_finite() || !stop.lng().is_finite() {
                return Err(TransitError::InvalidData(format!(
                    "stop {} on route {} has a non-finite position",
                    stop.id, id
                )));
            }
            if !seen.insert(stop.id) {
                return Err(TransitError::InvalidData(format!(
                    "stop {} appears twice on route {}",
                    stop.id, id
                )));
            }
        }

        Ok(Self {
            id,
            name: name.as_ref().into(),
            stops,
        })
    }

    pub fn id(&self) -> &RouteIdentifier {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stops(&self) -> &[Stop] {
        &self.stops
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    pub fn first_stop(&self) -> &Stop {
        &self.stops[0]
    }

    pub fn last_stop(&self) -> &Stop {
        &self.stops[self.stops.len() - 1]
    }

    pub fn stop(&self, id: StopId) -> Option<&Stop> {
        self.stops.iter().find(|stop| stop.id == id)
    }

    pub fn stop_at(&self, index: usize) -> Option<&Stop> {
        self.stops.get(index)
    }

    pub fn position_of(&self, id: StopId) -> Option<usize> {
        self.stops.iter().position(|stop| stop.id == id)
    }

    /// (start, end) stops as seen by a bus travelling in `direction`
    pub fn terminals(&self, direction: Direction) -> (&Stop, &Stop) {
        match direction {
            Direction::Forward => (self.first_stop(), self.last_stop()),
            Direction::Backward => (self.last_stop(), self.first_stop()),
        }
    }

    /// Nearest stop by haversine distance, as (index, stop, km).
    ///
    /// Ties resolve to the stop that comes first in route order.
    pub fn nearest_stop(&self, point: Point) -> (usize, &Stop, f64) {
        let mut best = (0, self.first_stop(), f64::INFINITY);
        for (index, stop) in self.stops.iter().enumerate() {
            let distance = haversine_distance_km(point, stop.location);
            if distance < best.2 {
                best = (index, stop, distance);
            }
        }
        best
    }
}

impl PartialEq for Route {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// One bus as reported by the realtime feed.
///
/// Every field is optional: push updates carry whatever the sender knew,
/// and older senders omit direction, speed and seat data entirely.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusReport {
    pub bus_id: Option<BusIdentifier>,
    pub route_id: Option<RouteIdentifier>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub direction: Option<Direction>,
    pub speed: Option<f64>,
    pub traffic_level: Option<f64>,
    pub driver_name: Option<String>,
    pub is_full: Option<bool>,
    pub occupied_seats: Option<u32>,
    pub total_seats: Option<u32>,
    pub current_stop: Option<String>,
    #[serde(alias = "nearest_stop")]
    pub next_stop: Option<String>,
    pub progress_pct: Option<f64>,
    pub distance_from_start: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl BusReport {
    pub fn new(bus_id: impl Into<BusIdentifier>) -> Self {
        Self {
            bus_id: Some(bus_id.into()),
            ..Self::default()
        }
    }

    /// Report carrying only an id and a position
    pub fn located(bus_id: impl Into<BusIdentifier>, lat: f64, lng: f64) -> Self {
        Self {
            lat: Some(lat),
            lng: Some(lng),
            ..Self::new(bus_id)
        }
    }

    pub fn location(&self) -> Option<Point> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(Point::new(lng, lat)),
            _ => None,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TransitError {
    #[error("Route not found: {0}")]
    RouteNotFound(RouteIdentifier),

    #[error("Stop {stop} not found on route {route}")]
    StopNotFound { route: RouteIdentifier, stop: StopId },

    #[error("Bus not found: {0}")]
    BusNotFound(BusIdentifier),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Lookup failed: {0}")]
    Lookup(String),
}

pub type Result<T> = std::result::Result<T, TransitError>;
