//! Local view of every bus active on the session's route.
//!
//! One entry per bus id. Entries are created by the first located report,
//! merged field by field on later reports and pruned by removal signals or
//! full-snapshot reconciliation.

use std::collections::{HashMap, HashSet};

use bustrack_transit::{BusIdentifier, BusReport, Direction, RouteIdentifier};
use chrono::{DateTime, Utc};
use geo::Point;
use itertools::Itertools;
use tracing::{debug, info};

use crate::error::{Result, invalid};

/// Last known state of one bus
#[derive(Clone, Debug, PartialEq)]
pub struct BusState {
    pub bus_id: BusIdentifier,
    pub route_id: RouteIdentifier,
    pub location: Point,
    pub direction: Direction,
    pub speed_kmh: Option<f64>,
    pub traffic_level: Option<f64>,
    pub driver_name: Option<String>,
    /// Effective capacity flag: driver override or seats exhausted
    pub is_full: bool,
    pub occupied_seats: u32,
    pub total_seats: u32,
    pub current_stop: Option<String>,
    pub next_stop: Option<String>,
    pub progress_pct: Option<f64>,
    pub distance_from_start_km: Option<f64>,
    pub updated_at: DateTime<Utc>,
    pub(crate) full_override: bool,
    pub(crate) reported: ReportedFields,
    first_seen: u64,
}

/// Inferable fields the sender has supplied at least once.
///
/// Once set, motion inference leaves the field alone.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct ReportedFields {
    pub direction: bool,
    pub speed: bool,
    pub current_stop: bool,
    pub next_stop: bool,
}

impl BusState {
    pub fn available_seats(&self) -> u32 {
        self.total_seats.saturating_sub(self.occupied_seats)
    }

    /// Whether the driver (or the server on their behalf) marked the bus full
    pub fn marked_full(&self) -> bool {
        self.full_override
    }

    /// Registration order, used to break distance ties
    pub fn first_seen(&self) -> u64 {
        self.first_seen
    }

    pub(crate) fn refresh_capacity(&mut self) {
        self.is_full = self.full_override || self.occupied_seats >= self.total_seats;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Upsert {
    Created,
    Updated,
    /// The report is older than what is already known; nothing changed
    Stale,
}

#[derive(Debug)]
pub struct BusRegistry {
    route_id: RouteIdentifier,
    default_total_seats: u32,
    buses: HashMap<BusIdentifier, BusState>,
    next_seq: u64,
}

impl BusRegistry {
    pub fn new(route_id: RouteIdentifier, default_total_seats: u32) -> Self {
        Self {
            route_id,
            default_total_seats: default_total_seats.max(1),
            buses: HashMap::new(),
            next_seq: 0,
        }
    }

    pub fn route_id(&self) -> &RouteIdentifier {
        &self.route_id
    }

    pub fn get(&self, bus_id: &BusIdentifier) -> Option<&BusState> {
        self.buses.get(bus_id)
    }

    pub(crate) fn get_mut(&mut self, bus_id: &BusIdentifier) -> Option<&mut BusState> {
        self.buses.get_mut(bus_id)
    }

    pub fn contains(&self, bus_id: &BusIdentifier) -> bool {
        self.buses.contains_key(bus_id)
    }

    pub fn len(&self) -> usize {
        self.buses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buses.is_empty()
    }

    /// Every tracked bus in first-seen order
    pub fn all(&self) -> Vec<&BusState> {
        self.buses
            .values()
            .sorted_by_key(|bus| bus.first_seen)
            .collect()
    }

    /// Check a report without applying it, returning its bus id.
    pub fn validate(&self, report: &BusReport) -> Result<BusIdentifier> {
        let bus_id = match &report.bus_id {
            Some(id) if !id.is_blank() => id.clone(),
            _ => return Err(invalid("bus report without a bus id")),
        };

        if let Some(route_id) = &report.route_id {
            if *route_id != self.route_id {
                return Err(invalid(format!(
                    "bus {bus_id} reported on route {route_id}, tracking {}",
                    self.route_id
                )));
            }
        }

        match (report.lat, report.lng) {
            (Some(lat), Some(lng)) => {
                if !(lat.is_finite() && lng.is_finite())
                    || !(-90.0..=90.0).contains(&lat)
                    || !(-180.0..=180.0).contains(&lng)
                {
                    return Err(invalid(format!("bus {bus_id} position ({lat}, {lng}) out of range")));
                }
            }
            (None, None) => {
                if !self.buses.contains_key(&bus_id) {
                    return Err(invalid(format!("first report for bus {bus_id} has no position")));
                }
            }
            _ => return Err(invalid(format!("bus {bus_id} reported half a position"))),
        }

        if let Some(speed) = report.speed {
            if !speed.is_finite() || speed < 0.0 {
                return Err(invalid(format!("bus {bus_id} speed {speed} is not a valid speed")));
            }
        }

        for (name, value) in [
            ("traffic_level", report.traffic_level),
            ("progress_pct", report.progress_pct),
            ("distance_from_start", report.distance_from_start),
        ] {
            if value.is_some_and(|v| !v.is_finite()) {
                return Err(invalid(format!("bus {bus_id} {name} is not finite")));
            }
        }

        let existing = self.buses.get(&bus_id);
        let total = report
            .total_seats
            .or(existing.map(|bus| bus.total_seats))
            .unwrap_or(self.default_total_seats);
        if total == 0 {
            return Err(invalid(format!("bus {bus_id} reported zero seat capacity")));
        }

        let occupied = report
            .occupied_seats
            .or(existing.map(|bus| bus.occupied_seats))
            .unwrap_or(0);
        if occupied > total {
            return Err(invalid(format!(
                "bus {bus_id} reports {occupied} occupied of {total} seats"
            )));
        }

        Ok(bus_id)
    }

    /// Merge a report into the registry.
    ///
    /// Fields absent from the report keep their previous value. A report
    /// observed before the entry's last update is dropped as stale.
    pub fn upsert(&mut self, report: BusReport, observed_at: DateTime<Utc>) -> Result<Upsert> {
        let bus_id = self.validate(&report)?;
        let observed_at = report.timestamp.unwrap_or(observed_at);

        if let Some(bus) = self.buses.get_mut(&bus_id) {
            if bus.updated_at > observed_at {
                debug!(bus = %bus_id, "dropping stale report");
                return Ok(Upsert::Stale);
            }

            merge(bus, report, observed_at);
            return Ok(Upsert::Updated);
        }

        let Some(location) = report.location() else {
            return Err(invalid(format!("first report for bus {bus_id} has no position")));
        };

        let mut bus = BusState {
            bus_id: bus_id.clone(),
            route_id: self.route_id.clone(),
            location,
            direction: report.direction.unwrap_or_default(),
            speed_kmh: None,
            traffic_level: None,
            driver_name: None,
            is_full: false,
            occupied_seats: 0,
            total_seats: self.default_total_seats,
            current_stop: None,
            next_stop: None,
            progress_pct: None,
            distance_from_start_km: None,
            updated_at: observed_at,
            full_override: false,
            reported: ReportedFields::default(),
            first_seen: self.next_seq,
        };
        self.next_seq += 1;

        merge(&mut bus, report, observed_at);
        info!(bus = %bus_id, route = %self.route_id, "tracking new bus");
        self.buses.insert(bus_id, bus);

        Ok(Upsert::Created)
    }

    /// Forget a bus. Removing an unknown bus is not an error.
    pub fn remove(&mut self, bus_id: &BusIdentifier) -> Option<BusState> {
        let removed = self.buses.remove(bus_id);
        if removed.is_some() {
            info!(bus = %bus_id, "bus removed");
        }
        removed
    }

    /// Drop every bus absent from a full snapshot, returning the dropped ids.
    ///
    /// Buses present in the snapshot are left untouched.
    pub fn reconcile_snapshot(&mut self, active: &[BusIdentifier]) -> Vec<BusIdentifier> {
        let active: HashSet<&BusIdentifier> = active.iter().collect();

        let stale: Vec<BusIdentifier> = self
            .all()
            .into_iter()
            .filter(|bus| !active.contains(&bus.bus_id))
            .map(|bus| bus.bus_id.clone())
            .collect();

        for bus_id in &stale {
            self.remove(bus_id);
        }

        stale
    }
}

fn merge(bus: &mut BusState, report: BusReport, observed_at: DateTime<Utc>) {
    if let Some(location) = report.location() {
        bus.location = location;
    }
    if let Some(direction) = report.direction {
        bus.direction = direction;
        bus.reported.direction = true;
    }
    if report.speed.is_some() {
        bus.speed_kmh = report.speed;
        bus.reported.speed = true;
    }
    if report.traffic_level.is_some() {
        bus.traffic_level = report.traffic_level;
    }
    if report.driver_name.is_some() {
        bus.driver_name = report.driver_name;
    }
    if let Some(total) = report.total_seats {
        bus.total_seats = total;
    }
    if let Some(occupied) = report.occupied_seats {
        bus.occupied_seats = occupied;
    }
    if let Some(is_full) = report.is_full {
        bus.full_override = is_full;
    }
    if report.current_stop.is_some() {
        bus.current_stop = report.current_stop;
        bus.reported.current_stop = true;
    }
    if report.next_stop.is_some() {
        bus.next_stop = report.next_stop;
        bus.reported.next_stop = true;
    }
    if report.progress_pct.is_some() {
        bus.progress_pct = report.progress_pct;
    }
    if report.distance_from_start.is_some() {
        bus.distance_from_start_km = report.distance_from_start;
    }

    bus.refresh_capacity();
    bus.updated_at = observed_at;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrackerError;
    use chrono::{Duration, TimeZone};

    fn t(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(seconds)
    }

    fn registry() -> BusRegistry {
        BusRegistry::new(RouteIdentifier::new("23"), 50)
    }

    #[test]
    fn test_upsert_creates_with_defaults() {
        let mut registry = registry();
        let outcome = registry.upsert(BusReport::located("A", 9.9, 78.1), t(0)).unwrap();

        assert_eq!(outcome, Upsert::Created);
        let bus = registry.get(&"A".into()).unwrap();
        assert_eq!(bus.direction, Direction::Forward);
        assert_eq!(bus.total_seats, 50);
        assert_eq!(bus.occupied_seats, 0);
        assert!(!bus.is_full);
    }

    #[test]
    fn test_upsert_merges_partial_fields() {
        let mut registry = registry();
        let mut first = BusReport::located("A", 9.9, 78.1);
        first.direction = Some(Direction::Backward);
        first.driver_name = Some("Kumar".into());
        first.speed = Some(22.0);
        registry.upsert(first, t(0)).unwrap();

        let mut second = BusReport::new("A");
        second.progress_pct = Some(40.0);
        assert_eq!(registry.upsert(second, t(5)).unwrap(), Upsert::Updated);

        let bus = registry.get(&"A".into()).unwrap();
        assert_eq!(bus.direction, Direction::Backward);
        assert_eq!(bus.driver_name.as_deref(), Some("Kumar"));
        assert_eq!(bus.speed_kmh, Some(22.0));
        assert_eq!(bus.progress_pct, Some(40.0));
        assert_eq!(bus.location, Point::new(78.1, 9.9));
        assert_eq!(bus.updated_at, t(5));
        assert!(bus.reported.direction && bus.reported.speed);
        assert!(!bus.reported.current_stop && !bus.reported.next_stop);
    }

    #[test]
    fn test_missing_id_rejected_without_side_effects() {
        let mut registry = registry();
        let mut report = BusReport::located("A", 9.9, 78.1);
        report.bus_id = None;

        assert!(matches!(
            registry.upsert(report, t(0)),
            Err(TrackerError::InvalidInput(_))
        ));
        assert!(registry.upsert(BusReport::located("  ", 9.9, 78.1), t(0)).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_invalid_updates_leave_entry_intact() {
        let mut registry = registry();
        registry.upsert(BusReport::located("A", 9.9, 78.1), t(0)).unwrap();

        let mut overfull = BusReport::new("A");
        overfull.occupied_seats = Some(51);
        assert!(registry.upsert(overfull, t(1)).is_err());

        let mut bad_position = BusReport::located("A", 95.0, 78.1);
        bad_position.speed = Some(10.0);
        assert!(registry.upsert(bad_position, t(1)).is_err());

        let mut wrong_route = BusReport::located("A", 9.0, 78.0);
        wrong_route.route_id = Some("48AC".into());
        assert!(registry.upsert(wrong_route, t(1)).is_err());

        let bus = registry.get(&"A".into()).unwrap();
        assert_eq!(bus.occupied_seats, 0);
        assert_eq!(bus.speed_kmh, None);
        assert_eq!(bus.location, Point::new(78.1, 9.9));
    }

    #[test]
    fn test_unlocated_first_report_rejected() {
        let mut registry = registry();
        assert!(registry.upsert(BusReport::new("A"), t(0)).is_err());
        assert!(!registry.contains(&"A".into()));
    }

    #[test]
    fn test_stale_report_dropped() {
        let mut registry = registry();
        registry.upsert(BusReport::located("A", 9.9, 78.1), t(10)).unwrap();

        let outcome = registry.upsert(BusReport::located("A", 9.0, 78.0), t(5)).unwrap();
        assert_eq!(outcome, Upsert::Stale);
        assert_eq!(registry.get(&"A".into()).unwrap().location, Point::new(78.1, 9.9));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut registry = registry();
        registry.upsert(BusReport::located("A", 9.9, 78.1), t(0)).unwrap();

        assert!(registry.remove(&"A".into()).is_some());
        assert!(registry.remove(&"A".into()).is_none());
        assert!(registry.remove(&"ghost".into()).is_none());
    }

    #[test]
    fn test_reconcile_prunes_only_absent_buses() {
        let mut registry = registry();
        registry.upsert(BusReport::located("A", 9.9, 78.1), t(0)).unwrap();
        let mut b = BusReport::located("B", 9.8, 78.2);
        b.speed = Some(31.0);
        b.direction = Some(Direction::Backward);
        registry.upsert(b, t(1)).unwrap();
        let before = registry.get(&"B".into()).unwrap().clone();

        let removed = registry.reconcile_snapshot(&["B".into()]);

        assert_eq!(removed, vec![BusIdentifier::new("A")]);
        assert!(!registry.contains(&"A".into()));
        assert_eq!(registry.get(&"B".into()), Some(&before));
    }

    #[test]
    fn test_all_in_first_seen_order() {
        let mut registry = registry();
        for (i, id) in ["C", "A", "B"].into_iter().enumerate() {
            registry
                .upsert(BusReport::located(id, 9.9, 78.1), t(i as i64))
                .unwrap();
        }
        registry.upsert(BusReport::located("A", 9.5, 78.5), t(9)).unwrap();

        let order: Vec<&str> = registry.all().iter().map(|b| b.bus_id.as_str()).collect();
        assert_eq!(order, vec!["C", "A", "B"]);
    }

    #[test]
    fn test_full_flag_and_seats() {
        let mut registry = registry();
        let mut report = BusReport::located("A", 9.9, 78.1);
        report.is_full = Some(true);
        report.occupied_seats = Some(10);
        registry.upsert(report, t(0)).unwrap();

        let bus = registry.get(&"A".into()).unwrap();
        assert!(bus.is_full);
        assert!(bus.marked_full());
        assert_eq!(bus.available_seats(), 40);

        let mut seats = BusReport::new("A");
        seats.is_full = Some(false);
        seats.occupied_seats = Some(50);
        registry.upsert(seats, t(1)).unwrap();
        assert!(registry.get(&"A".into()).unwrap().is_full);
    }
}
