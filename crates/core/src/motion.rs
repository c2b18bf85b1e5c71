//! Speed, direction and stop inference from a bus's recent positions.
//!
//! Used to fill in fields an older sender leaves out. Values the sender
//! did report always win over anything inferred here.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use bustrack_transit::{BusIdentifier, Direction, Route, RouteProvider, Stop, haversine_distance_km};
use chrono::{DateTime, Utc};
use geo::Point;
use tracing::debug;

use crate::config::TrackerConfig;

#[derive(Clone, Copy, Debug)]
struct Sample {
    location: Point,
    at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct PassedStop {
    index: usize,
    direction: Direction,
}

#[derive(Debug, Default)]
struct BusMotion {
    samples: VecDeque<Sample>,
    direction: Option<Direction>,
    last_passed: Option<PassedStop>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NextStop {
    pub index: usize,
    pub stop: Stop,
    pub distance_km: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MotionEstimate {
    pub speed_kmh: f64,
    pub direction: Direction,
    /// Stop the bus is standing at, if any
    pub current_stop: Option<Stop>,
    pub next_stop: Option<NextStop>,
}

pub struct MotionTracker {
    history_len: usize,
    max_speed_kmh: f64,
    at_stop_km: f64,
    next_stop_min_km: f64,
    /// Answers at-stop proximity queries
    stops: Arc<dyn RouteProvider>,
    buses: HashMap<BusIdentifier, BusMotion>,
}

impl MotionTracker {
    pub fn new(config: &TrackerConfig, stops: Arc<dyn RouteProvider>) -> Self {
        Self {
            history_len: config.position_history_len.max(2),
            max_speed_kmh: config.max_speed_kmh,
            at_stop_km: config.at_stop_threshold_km,
            next_stop_min_km: config.next_stop_min_distance_km,
            stops,
            buses: HashMap::new(),
        }
    }

    /// Record a position and derive what can be derived from the history.
    pub fn observe(
        &mut self,
        bus_id: &BusIdentifier,
        location: Point,
        at: DateTime<Utc>,
        route: &Route,
    ) -> MotionEstimate {
        let motion = self.buses.entry(bus_id.clone()).or_default();

        motion.samples.push_back(Sample { location, at });
        while motion.samples.len() > self.history_len {
            motion.samples.pop_front();
        }

        let speed_kmh = speed(&motion.samples, self.max_speed_kmh);
        let direction = direction(&motion.samples, motion.direction, route);
        if motion.direction.is_some_and(|previous| previous != direction) {
            debug!(bus = %bus_id, %direction, "inferred direction changed");
        }
        motion.direction = Some(direction);

        let current_stop = self
            .stops
            .stops_within(route.id(), location, self.at_stop_km)
            .into_iter()
            .next();

        let next_stop = next_stop(motion, location, direction, route, self.at_stop_km, self.next_stop_min_km);

        MotionEstimate {
            speed_kmh,
            direction,
            current_stop,
            next_stop,
        }
    }

    pub fn forget(&mut self, bus_id: &BusIdentifier) {
        self.buses.remove(bus_id);
    }
}

/// Oldest-to-newest distance over elapsed time, clamped to `[0, max]`.
fn speed(samples: &VecDeque<Sample>, max_speed_kmh: f64) -> f64 {
    let (Some(oldest), Some(newest)) = (samples.front(), samples.back()) else {
        return 0.0;
    };
    if samples.len() < 2 {
        return 0.0;
    }

    let seconds = (newest.at - oldest.at).num_milliseconds() as f64 / 1000.0;
    if seconds < 0.1 {
        return 0.0;
    }

    let km = haversine_distance_km(oldest.location, newest.location);
    (km / seconds * 3600.0).clamp(0.0, max_speed_kmh)
}

fn direction(samples: &VecDeque<Sample>, previous: Option<Direction>, route: &Route) -> Direction {
    if route.len() < 2 {
        return Direction::Forward;
    }

    let (Some(oldest), Some(newest)) = (samples.front(), samples.back()) else {
        return previous.unwrap_or_default();
    };

    // Too little history: a bus near the first stop is assumed to head away from it
    if samples.len() < 3 {
        let to_first = haversine_distance_km(newest.location, route.first_stop().location);
        let to_last = haversine_distance_km(newest.location, route.last_stop().location);
        return if to_first < to_last {
            Direction::Forward
        } else {
            Direction::Backward
        };
    }

    let (from, _, _) = route.nearest_stop(oldest.location);
    let (to, _, _) = route.nearest_stop(newest.location);

    match to.cmp(&from) {
        std::cmp::Ordering::Greater => Direction::Forward,
        std::cmp::Ordering::Less => Direction::Backward,
        std::cmp::Ordering::Equal => previous.unwrap_or_default(),
    }
}

fn next_stop(
    motion: &mut BusMotion,
    location: Point,
    direction: Direction,
    route: &Route,
    at_stop_km: f64,
    min_distance_km: f64,
) -> Option<NextStop> {
    let stops = route.stops();
    let (nearest, nearest_stop, nearest_km) = route.nearest_stop(location);

    let towards = |index: usize| NextStop {
        index,
        stop: stops[index].clone(),
        distance_km: haversine_distance_km(location, stops[index].location),
    };
    let step = |index: usize| match direction {
        Direction::Forward => (index + 1 < stops.len()).then_some(index + 1),
        Direction::Backward => index.checked_sub(1),
    };

    if nearest_km <= at_stop_km {
        return Some(match step(nearest) {
            Some(next) => {
                motion.last_passed = Some(PassedStop {
                    index: nearest,
                    direction,
                });
                towards(next)
            }
            // Standing at the terminal of this direction
            None => NextStop {
                index: nearest,
                stop: nearest_stop.clone(),
                distance_km: nearest_km,
            },
        });
    }

    if let Some(passed) = motion.last_passed.filter(|passed| passed.direction == direction) {
        if let Some(next) = step(passed.index) {
            return Some(towards(next));
        }
    }

    let ahead: Box<dyn Iterator<Item = usize>> = match direction {
        Direction::Forward => Box::new(nearest..stops.len()),
        Direction::Backward => Box::new((0..=nearest).rev()),
    };
    for index in ahead {
        let candidate = towards(index);
        if candidate.distance_km > min_distance_km {
            return Some(candidate);
        }
    }

    Some(NextStop {
        index: nearest,
        stop: nearest_stop.clone(),
        distance_km: nearest_km,
    })
}
