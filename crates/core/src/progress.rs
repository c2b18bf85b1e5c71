//! Direction-aware progress along a route.
//!
//! Everything here is re-derivable from the bus's direction and the route's
//! stop list; the only state kept is the last direction seen per bus, so a
//! reversal can be logged.

use std::collections::HashMap;
use std::sync::Arc;

use bustrack_transit::{BusIdentifier, Direction, Route};
use tracing::debug;

use crate::distance::StopDistanceTable;
use crate::registry::BusState;

#[derive(Clone, Debug, PartialEq)]
pub struct Progress {
    pub direction: Direction,
    pub start_label: Arc<str>,
    pub end_label: Arc<str>,
    /// Share of the route travelled, within [0, 100]
    pub progress_pct: Option<f64>,
    pub distance_from_start_km: Option<f64>,
}

impl Progress {
    /// "42.5%", or "--" when upstream never supplied a value
    pub fn percent_label(&self) -> String {
        match self.progress_pct {
            Some(pct) => format!("{pct:.1}%"),
            None => "--".to_string(),
        }
    }
}

pub fn clamp_progress(pct: f64) -> f64 {
    pct.clamp(0.0, 100.0)
}

/// (start, end) stop names for a bus travelling in `direction`
pub fn labels(route: &Route, direction: Direction) -> (Arc<str>, Arc<str>) {
    let (start, end) = route.terminals(direction);
    (start.name.clone(), end.name.clone())
}

#[derive(Debug, Default)]
pub struct ProgressTracker {
    last_direction: HashMap<BusIdentifier, Direction>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Progress of `bus` on `route`.
    ///
    /// The percentage comes from upstream. When only a distance from start
    /// was supplied, the route's distance table turns it into a share of
    /// the route length.
    pub fn update(
        &mut self,
        bus: &BusState,
        route: &Route,
        distances: Option<&StopDistanceTable>,
    ) -> Progress {
        if let Some(previous) = self.last_direction.insert(bus.bus_id.clone(), bus.direction) {
            if previous != bus.direction {
                debug!(bus = %bus.bus_id, from = %previous, to = %bus.direction, "bus reversed");
            }
        }

        let (start_label, end_label) = labels(route, bus.direction);

        let progress_pct = bus
            .progress_pct
            .map(clamp_progress)
            .or_else(|| distances?.progress_pct(route.id(), bus.distance_from_start_km?));

        Progress {
            direction: bus.direction,
            start_label,
            end_label,
            progress_pct,
            distance_from_start_km: bus.distance_from_start_km.map(|km| km.max(0.0)),
        }
    }

    pub fn last_direction(&self, bus_id: &BusIdentifier) -> Option<Direction> {
        self.last_direction.get(bus_id).copied()
    }

    pub fn forget(&mut self, bus_id: &BusIdentifier) {
        self.last_direction.remove(bus_id);
    }
}
