//! Seat counting, capacity flags and overflow bookings.
//!
//! Seat counts live on the registry entry; the arbiter owns only the
//! per-bus priority queues. A queued booking never takes a seat that frees
//! up later: promotion is left to the server.

use std::collections::HashMap;

use bustrack_transit::{BusIdentifier, StopId};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Result, invalid};
use crate::registry::{BusRegistry, BusState};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SeatCount {
    pub occupied: u32,
    pub total: u32,
    pub available: u32,
    pub is_full: bool,
}

impl From<&BusState> for SeatCount {
    fn from(bus: &BusState) -> Self {
        Self {
            occupied: bus.occupied_seats,
            total: bus.total_seats,
            available: bus.available_seats(),
            is_full: bus.is_full,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Booking {
    pub bus_id: BusIdentifier,
    pub stop_id: StopId,
    pub seat_number: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QueuedBooking {
    pub bus_id: BusIdentifier,
    pub stop_id: StopId,
    /// 1 for the first overflow request of the trip
    pub position: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BookingOutcome {
    Confirmed(Booking),
    Queued(QueuedBooking),
}

#[derive(Debug, Default)]
struct PriorityQueue {
    issued: u32,
    waiting: Vec<QueuedBooking>,
}

#[derive(Debug, Default)]
pub struct SeatArbiter {
    queues: HashMap<BusIdentifier, PriorityQueue>,
}

impl SeatArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Board (+1) or alight (-1) one passenger, clamped to `[0, total]`.
    pub fn adjust_seat_count(
        &mut self,
        registry: &mut BusRegistry,
        bus_id: &BusIdentifier,
        delta: i32,
    ) -> Result<SeatCount> {
        let bus = tracked(registry, bus_id)?;

        match delta {
            1 => bus.occupied_seats = (bus.occupied_seats + 1).min(bus.total_seats),
            -1 => bus.occupied_seats = bus.occupied_seats.saturating_sub(1),
            other => return Err(invalid(format!("seat delta must be +1 or -1, got {other}"))),
        }
        bus.refresh_capacity();

        debug!(
            bus = %bus_id,
            occupied = bus.occupied_seats,
            total = bus.total_seats,
            "seat count adjusted"
        );
        Ok(SeatCount::from(&*bus))
    }

    /// Driver toggle. Overrides the seat counter for visibility purposes.
    pub fn set_capacity_flag(
        &mut self,
        registry: &mut BusRegistry,
        bus_id: &BusIdentifier,
        is_full: bool,
    ) -> Result<SeatCount> {
        let bus = tracked(registry, bus_id)?;
        bus.full_override = is_full;
        bus.refresh_capacity();

        info!(bus = %bus_id, is_full, "capacity flag set");
        Ok(SeatCount::from(&*bus))
    }

    /// Take a seat if one is free, otherwise join the bus's priority queue.
    pub fn request_booking(
        &mut self,
        registry: &mut BusRegistry,
        bus_id: &BusIdentifier,
        stop_id: StopId,
    ) -> Result<BookingOutcome> {
        let bus = tracked(registry, bus_id)?;

        if bus.available_seats() > 0 {
            bus.occupied_seats += 1;
            bus.refresh_capacity();

            let booking = Booking {
                bus_id: bus_id.clone(),
                stop_id,
                seat_number: bus.occupied_seats,
            };
            info!(bus = %bus_id, seat = booking.seat_number, "booking confirmed");
            return Ok(BookingOutcome::Confirmed(booking));
        }

        let queue = self.queues.entry(bus_id.clone()).or_default();
        queue.issued += 1;
        let queued = QueuedBooking {
            bus_id: bus_id.clone(),
            stop_id,
            position: queue.issued,
        };
        queue.waiting.push(queued.clone());

        info!(bus = %bus_id, position = queued.position, "bus full, booking queued");
        Ok(BookingOutcome::Queued(queued))
    }

    pub fn queued(&self, bus_id: &BusIdentifier) -> &[QueuedBooking] {
        self.queues
            .get(bus_id)
            .map(|queue| queue.waiting.as_slice())
            .unwrap_or_default()
    }

    /// The bus finished its trip or left: positions restart at 1.
    pub fn clear_trip(&mut self, bus_id: &BusIdentifier) {
        self.queues.remove(bus_id);
    }
}

fn tracked<'r>(registry: &'r mut BusRegistry, bus_id: &BusIdentifier) -> Result<&'r mut BusState> {
    registry
        .get_mut(bus_id)
        .ok_or_else(|| invalid(format!("bus {bus_id} is not tracked")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bustrack_transit::{BusReport, RouteIdentifier};
    use chrono::Utc;

    fn registry_with_bus(total: u32, occupied: u32) -> BusRegistry {
        let mut registry = BusRegistry::new(RouteIdentifier::new("23"), 50);
        let mut report = BusReport::located("A", 9.9, 78.1);
        report.total_seats = Some(total);
        report.occupied_seats = Some(occupied);
        registry.upsert(report, Utc::now()).unwrap();
        registry
    }

    #[test]
    fn test_increment_sets_full_on_boundary_and_clamps() {
        let mut registry = registry_with_bus(3, 0);
        let mut arbiter = SeatArbiter::new();
        let bus: BusIdentifier = "A".into();

        assert!(!arbiter.adjust_seat_count(&mut registry, &bus, 1).unwrap().is_full);
        assert!(!arbiter.adjust_seat_count(&mut registry, &bus, 1).unwrap().is_full);

        let boundary = arbiter.adjust_seat_count(&mut registry, &bus, 1).unwrap();
        assert_eq!(boundary.occupied, 3);
        assert!(boundary.is_full);

        let beyond = arbiter.adjust_seat_count(&mut registry, &bus, 1).unwrap();
        assert_eq!(beyond.occupied, 3);
        assert_eq!(beyond.available, 0);
    }

    #[test]
    fn test_decrement_never_negative() {
        let mut registry = registry_with_bus(3, 1);
        let mut arbiter = SeatArbiter::new();
        let bus: BusIdentifier = "A".into();

        assert_eq!(arbiter.adjust_seat_count(&mut registry, &bus, -1).unwrap().occupied, 0);
        assert_eq!(arbiter.adjust_seat_count(&mut registry, &bus, -1).unwrap().occupied, 0);
    }

    #[test]
    fn test_decrement_clears_derived_full_but_not_override() {
        let mut registry = registry_with_bus(2, 2);
        let mut arbiter = SeatArbiter::new();
        let bus: BusIdentifier = "A".into();
        assert!(registry.get(&bus).unwrap().is_full);

        assert!(!arbiter.adjust_seat_count(&mut registry, &bus, -1).unwrap().is_full);

        arbiter.set_capacity_flag(&mut registry, &bus, true).unwrap();
        let count = arbiter.adjust_seat_count(&mut registry, &bus, -1).unwrap();
        assert!(count.is_full);
        assert_eq!(count.available, 2);
    }

    #[test]
    fn test_invalid_delta_and_unknown_bus() {
        let mut registry = registry_with_bus(3, 0);
        let mut arbiter = SeatArbiter::new();

        assert!(arbiter.adjust_seat_count(&mut registry, &"A".into(), 2).is_err());
        assert!(arbiter.adjust_seat_count(&mut registry, &"A".into(), 0).is_err());
        assert!(arbiter.adjust_seat_count(&mut registry, &"ghost".into(), 1).is_err());
        assert_eq!(registry.get(&"A".into()).unwrap().occupied_seats, 0);
    }

    #[test]
    fn test_booking_confirms_then_queues() {
        let mut registry = registry_with_bus(2, 1);
        let mut arbiter = SeatArbiter::new();
        let bus: BusIdentifier = "A".into();

        let confirmed = arbiter.request_booking(&mut registry, &bus, StopId(4)).unwrap();
        assert_eq!(
            confirmed,
            BookingOutcome::Confirmed(Booking {
                bus_id: bus.clone(),
                stop_id: StopId(4),
                seat_number: 2,
            })
        );
        assert!(registry.get(&bus).unwrap().is_full);

        let first = arbiter.request_booking(&mut registry, &bus, StopId(4)).unwrap();
        let second = arbiter.request_booking(&mut registry, &bus, StopId(5)).unwrap();
        assert!(matches!(first, BookingOutcome::Queued(QueuedBooking { position: 1, .. })));
        assert!(matches!(second, BookingOutcome::Queued(QueuedBooking { position: 2, .. })));
        assert_eq!(registry.get(&bus).unwrap().occupied_seats, 2);
        assert_eq!(arbiter.queued(&bus).len(), 2);
    }

    #[test]
    fn test_freed_seat_not_given_to_queue() {
        let mut registry = registry_with_bus(1, 1);
        let mut arbiter = SeatArbiter::new();
        let bus: BusIdentifier = "A".into();

        arbiter.request_booking(&mut registry, &bus, StopId(1)).unwrap();
        arbiter.adjust_seat_count(&mut registry, &bus, -1).unwrap();

        assert_eq!(registry.get(&bus).unwrap().occupied_seats, 0);
        assert_eq!(arbiter.queued(&bus).len(), 1);
    }

    #[test]
    fn test_clear_trip_resets_positions() {
        let mut registry = registry_with_bus(1, 1);
        let mut arbiter = SeatArbiter::new();
        let bus: BusIdentifier = "A".into();

        arbiter.request_booking(&mut registry, &bus, StopId(1)).unwrap();
        arbiter.clear_trip(&bus);
        assert!(arbiter.queued(&bus).is_empty());

        let again = arbiter.request_booking(&mut registry, &bus, StopId(1)).unwrap();
        assert!(matches!(again, BookingOutcome::Queued(QueuedBooking { position: 1, .. })));
    }
}
