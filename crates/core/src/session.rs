//! One passenger's or driver's view of a single route.
//!
//! A [`TrackingSession`] is built when a route is picked and dropped when the
//! route changes. Handlers run to completion one event at a time, so nothing
//! in here needs locking.
//!
//! ## Selection cycle
//!
//! [`TrackingSession::select`] answers immediately with a haversine-based,
//! approximate report and a [`LookupTicket`]. The ticket is later resolved
//! with the outcome of an authoritative road-distance lookup:
//! - success replaces the distance and ETA, clearing `approximate`
//! - failure serves the haversine value of the same cycle, still approximate
//! - a ticket from an older cycle, or for a bus since removed or full, is discarded

use std::sync::Arc;

use bustrack_transit::{
    BusFeed, BusIdentifier, BusReport, Direction, Route, RouteIdentifier, RouteProvider, Stop,
    StopId, TransitError, WaypointDistance,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::capacity::{BookingOutcome, SeatArbiter, SeatCount};
use crate::config::TrackerConfig;
use crate::distance::{StopDistanceTable, TableWaypoints};
use crate::error::{Result, TrackerError, invalid};
use crate::eta::EtaEstimator;
use crate::events::{BookingStatus, InboundEvent, OutboundSignal, RemovalReason};
use crate::motion::MotionTracker;
use crate::progress::{Progress, ProgressTracker};
use crate::registry::{BusRegistry, BusState, Upsert};
use crate::selector::{WaitingState, closest_bus, reference_stop};
use crate::waiting::{WaitingBoard, WaitingCount};

/// What a passenger is shown for the selected bus
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EtaReport {
    pub bus_id: BusIdentifier,
    pub stop: Stop,
    pub distance_km: f64,
    pub eta_minutes: f64,
    /// Haversine distance rather than a road distance
    pub approximate: bool,
    pub speed_kmh: Option<f64>,
    pub direction: Direction,
    pub available_seats: u32,
    #[serde(skip)]
    pub progress: Progress,
}

/// Pending authoritative lookup for one selection cycle
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LookupTicket {
    cycle: u64,
    bus_id: BusIdentifier,
    stop_id: StopId,
}

impl LookupTicket {
    pub fn bus_id(&self) -> &BusIdentifier {
        &self.bus_id
    }

    pub fn stop_id(&self) -> StopId {
        self.stop_id
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Selection {
    /// `None` when no bus may be shown
    pub report: Option<EtaReport>,
    pub lookup: Option<LookupTicket>,
}

pub struct TrackingSession {
    config: TrackerConfig,
    route: Arc<Route>,
    eta: EtaEstimator,
    registry: BusRegistry,
    motion: MotionTracker,
    progress: ProgressTracker,
    seats: SeatArbiter,
    waiting: WaitingBoard,
    distances: Option<Arc<StopDistanceTable>>,
    cycle: u64,
    provisional: Option<EtaReport>,
    bus_count: Option<u32>,
    booking: Option<BookingStatus>,
    /// Bus this passenger holds a seat or queue place on
    booked_on: Option<BusIdentifier>,
    outbox: Vec<OutboundSignal>,
}

impl TrackingSession {
    /// Start tracking `route_id`, with stops and proximity answered by `provider`.
    pub fn new(
        provider: Arc<dyn RouteProvider>,
        route_id: &RouteIdentifier,
        config: TrackerConfig,
    ) -> Result<Self> {
        config.validate()?;
        let route = provider
            .route(route_id)
            .ok_or_else(|| TransitError::RouteNotFound(route_id.clone()))?;
        info!(route = %route.id(), stops = route.len(), "tracking session started");

        Ok(Self {
            eta: EtaEstimator::new(&config),
            registry: BusRegistry::new(route.id().clone(), config.default_total_seats),
            motion: MotionTracker::new(&config, provider),
            progress: ProgressTracker::new(),
            seats: SeatArbiter::new(),
            waiting: WaitingBoard::new(),
            distances: None,
            cycle: 0,
            provisional: None,
            bus_count: None,
            booking: None,
            booked_on: None,
            outbox: Vec::new(),
            config,
            route,
        })
    }

    /// Use measured road distances for progress and [`Self::table_waypoints`]
    pub fn with_distance_table(mut self, table: Arc<StopDistanceTable>) -> Self {
        if !table.contains(self.route.id()) {
            warn!(route = %self.route.id(), "distance table has no entry for this route");
        }
        self.distances = Some(table);
        self
    }

    pub fn route(&self) -> &Arc<Route> {
        &self.route
    }

    pub fn route_id(&self) -> &RouteIdentifier {
        self.route.id()
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn registry(&self) -> &BusRegistry {
        &self.registry
    }

    pub fn bus(&self, bus_id: &BusIdentifier) -> Option<&BusState> {
        self.registry.get(bus_id)
    }

    /// Bus count last announced by the server
    pub fn bus_count(&self) -> Option<u32> {
        self.bus_count
    }

    pub fn booking_status(&self) -> Option<&BookingStatus> {
        self.booking.as_ref()
    }

    pub fn waiting_counts(&self) -> Vec<WaitingCount> {
        self.waiting.counts(&self.route)
    }

    pub fn seats(&self) -> &SeatArbiter {
        &self.seats
    }

    /// Signals produced since the last drain, oldest first
    pub fn drain_outbound(&mut self) -> Vec<OutboundSignal> {
        std::mem::take(&mut self.outbox)
    }

    // ------------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------------

    pub fn handle(&mut self, event: InboundEvent) -> Result<()> {
        self.handle_at(event, Utc::now())
    }

    /// Apply one inbound event received at `now`.
    ///
    /// A malformed event is rejected without touching any state.
    pub fn handle_at(&mut self, event: InboundEvent, now: DateTime<Utc>) -> Result<()> {
        debug!(event = event.name(), "inbound event");

        match event {
            InboundEvent::BusUpdate(report) => {
                self.apply_report(report, now)?;
            }
            InboundEvent::AllBusesUpdate { buses } => {
                self.poll(buses, now);
            }
            InboundEvent::BusRemoved { bus_id, reason } => match reason {
                // Still sharing, just hidden from passengers
                Some(RemovalReason::Full) if self.registry.contains(&bus_id) => {
                    self.seats.set_capacity_flag(&mut self.registry, &bus_id, true)?;
                }
                _ => self.remove_bus(&bus_id),
            },
            InboundEvent::BusCountUpdate { count } => {
                self.bus_count = Some(count);
            }
            InboundEvent::SeatCountUpdate {
                bus_id,
                occupied_seats,
                total_seats,
            } => {
                let report = BusReport {
                    occupied_seats: Some(occupied_seats),
                    total_seats,
                    ..BusReport::new(bus_id)
                };
                self.apply_report(report, now)?;
            }
            InboundEvent::CapacityUpdate { bus_id, is_full } => {
                let report = BusReport {
                    is_full: Some(is_full),
                    ..BusReport::new(bus_id)
                };
                self.apply_report(report, now)?;
            }
            InboundEvent::BookingConfirmed { bus_id, seat_number } => {
                info!(bus = %bus_id, seat = seat_number, "server confirmed booking");
                self.booking = Some(BookingStatus::Confirmed { bus_id, seat_number });
            }
            InboundEvent::PriorityQueueAssigned { bus_id, position } => {
                info!(bus = %bus_id, position, "server queued booking");
                self.booking = Some(BookingStatus::Queued { bus_id, position });
            }
            InboundEvent::BookingError { message } => {
                warn!(%message, "booking failed");
                self.booking = Some(BookingStatus::Failed { message });
                self.booked_on = None;
            }
            InboundEvent::WaitingUpdate { stop_id, count } => {
                self.waiting.set(stop_id, count);
            }
            InboundEvent::WaitingStats { counts } => {
                self.waiting.replace(&counts);
            }
        }

        Ok(())
    }

    /// Reconcile against a full snapshot, then merge each entry.
    ///
    /// Buses missing from the snapshot are dropped. Entries that fail
    /// validation are skipped with a warning. Returns the dropped ids.
    pub fn poll(&mut self, snapshot: Vec<BusReport>, fetched_at: DateTime<Utc>) -> Vec<BusIdentifier> {
        let active: Vec<BusIdentifier> = snapshot
            .iter()
            .filter_map(|report| report.bus_id.clone())
            .filter(|id| !id.is_blank())
            .collect();

        let dropped = self.registry.reconcile_snapshot(&active);
        for bus_id in &dropped {
            self.forget(bus_id);
        }

        for report in snapshot {
            if let Err(err) = self.apply_report(report, fetched_at) {
                warn!(error = %err, "skipping snapshot entry");
            }
        }

        dropped
    }

    /// Fetch and apply a snapshot from `feed`.
    ///
    /// The snapshot is stamped with the time the request went out, so a push
    /// that arrived while it was in flight is not overwritten.
    pub async fn poll_feed(&mut self, feed: &dyn BusFeed) -> Result<Vec<BusIdentifier>> {
        let requested_at = Utc::now();
        let route_id = self.route.id().clone();
        let snapshot = feed.active_buses(&route_id).await?;

        Ok(self.poll(snapshot, requested_at))
    }

    fn apply_report(&mut self, report: BusReport, now: DateTime<Utc>) -> Result<Upsert> {
        let bus_id = self.registry.validate(&report)?;
        let observed_at = report.timestamp.unwrap_or(now);
        let location = report.location();

        let outcome = self.registry.upsert(report, now)?;
        if outcome == Upsert::Stale {
            return Ok(outcome);
        }

        let Some(location) = location else {
            return Ok(outcome);
        };

        let estimate = self.motion.observe(&bus_id, location, observed_at, &self.route);
        if let Some(bus) = self.registry.get_mut(&bus_id) {
            let reported = bus.reported;
            if !reported.direction {
                bus.direction = estimate.direction;
            }
            if !reported.speed {
                bus.speed_kmh = Some(estimate.speed_kmh);
            }
            if !reported.current_stop {
                bus.current_stop = estimate.current_stop.map(|stop| stop.name.to_string());
            }
            if !reported.next_stop {
                bus.next_stop = estimate.next_stop.map(|next| next.stop.name.to_string());
            }
        }

        Ok(outcome)
    }

    fn remove_bus(&mut self, bus_id: &BusIdentifier) {
        self.registry.remove(bus_id);
        self.forget(bus_id);
    }

    fn forget(&mut self, bus_id: &BusIdentifier) {
        self.motion.forget(bus_id);
        self.progress.forget(bus_id);
        self.seats.clear_trip(bus_id);
        if self.booked_on.as_ref() == Some(bus_id) {
            self.booked_on = None;
        }
    }

    // ------------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------------

    /// Start a selection cycle: pick the closest eligible bus and report on it.
    pub fn select(&mut self, waiting: &WaitingState) -> Selection {
        self.cycle += 1;
        self.provisional = None;

        let stop = reference_stop(&self.route, waiting).clone();
        let Some(candidate) = closest_bus(&self.registry, &stop) else {
            debug!(cycle = self.cycle, stop = %stop.id, "no eligible bus");
            return Selection::default();
        };

        let Some(report) = self.report_for(&candidate.bus_id, stop, candidate.distance_km, true) else {
            return Selection::default();
        };

        debug!(
            cycle = self.cycle,
            bus = %report.bus_id,
            km = report.distance_km,
            "provisional selection"
        );
        let lookup = LookupTicket {
            cycle: self.cycle,
            bus_id: report.bus_id.clone(),
            stop_id: report.stop.id,
        };
        self.provisional = Some(report.clone());

        Selection {
            report: Some(report),
            lookup: Some(lookup),
        }
    }

    /// Finish a selection cycle with the outcome of its authoritative lookup.
    ///
    /// Returns `None` when a newer cycle has started since the ticket was
    /// issued, or the bus has gone or turned full in the meantime.
    pub fn resolve_lookup(&mut self, ticket: LookupTicket, result: Result<f64>) -> Option<EtaReport> {
        let provisional = self
            .provisional
            .as_ref()
            .filter(|report| ticket.cycle == self.cycle && report.bus_id == ticket.bus_id)?
            .clone();

        if !self.registry.get(&ticket.bus_id).is_some_and(|bus| !bus.is_full) {
            debug!(bus = %ticket.bus_id, "selected bus no longer eligible");
            self.provisional = None;
            return None;
        }

        let result = result.and_then(|km| {
            if km.is_finite() && km >= 0.0 {
                Ok(km)
            } else {
                Err(TrackerError::LookupFailure(format!("unusable distance {km}")))
            }
        });

        match result {
            Ok(km) => self.report_for(&ticket.bus_id, provisional.stop, km, false),
            Err(err) => {
                warn!(bus = %ticket.bus_id, error = %err, "serving approximate distance");
                Some(provisional)
            }
        }
    }

    /// Both phases of a selection cycle against `lookup`.
    ///
    /// The lookup is bounded by the configured timeout. Returns the final
    /// report, or `None` when no bus may be shown.
    pub async fn refresh_eta(
        &mut self,
        waiting: &WaitingState,
        lookup: &dyn WaypointDistance,
    ) -> Option<EtaReport> {
        let selection = self.select(waiting);
        let ticket = selection.lookup?;

        let timeout = self.config.lookup_timeout();
        let route_id = self.route.id().clone();
        let pending = lookup.waypoint_distance(&route_id, &ticket.bus_id, ticket.stop_id);

        let result = match tokio::time::timeout(timeout, pending).await {
            Ok(Ok(km)) => Ok(km),
            Ok(Err(err)) => Err(TrackerError::LookupFailure(err.to_string())),
            Err(_) => Err(TrackerError::LookupFailure(format!(
                "no answer within {} ms",
                timeout.as_millis()
            ))),
        };

        self.resolve_lookup(ticket, result)
    }

    /// Road distances answered from the session's table, as of now
    pub fn table_waypoints(&self) -> Option<TableWaypoints> {
        let table = self.distances.clone()?;
        Some(TableWaypoints::new(table, &self.registry))
    }

    /// Current progress of a tracked bus
    pub fn progress_of(&mut self, bus_id: &BusIdentifier) -> Option<Progress> {
        let bus = self.registry.get(bus_id)?;
        Some(self.progress.update(bus, &self.route, self.distances.as_deref()))
    }

    fn report_for(
        &mut self,
        bus_id: &BusIdentifier,
        stop: Stop,
        distance_km: f64,
        approximate: bool,
    ) -> Option<EtaReport> {
        let bus = self.registry.get(bus_id)?;

        let eta_minutes = match self.eta.estimate(distance_km, bus.traffic_level) {
            Ok(minutes) => minutes,
            Err(err) => {
                warn!(bus = %bus_id, error = %err, "no ETA for bus");
                return None;
            }
        };
        let progress = self.progress.update(bus, &self.route, self.distances.as_deref());

        Some(EtaReport {
            bus_id: bus_id.clone(),
            stop,
            distance_km,
            eta_minutes,
            approximate,
            speed_kmh: bus.speed_kmh,
            direction: bus.direction,
            available_seats: bus.available_seats(),
            progress,
        })
    }

    // ------------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------------

    /// Driver: one passenger boarded
    pub fn board(&mut self, bus_id: &BusIdentifier) -> Result<SeatCount> {
        let count = self.seats.adjust_seat_count(&mut self.registry, bus_id, 1)?;
        self.outbox.push(OutboundSignal::SeatIncrement {
            bus_id: bus_id.clone(),
        });
        Ok(count)
    }

    /// Driver: one passenger got off
    pub fn alight(&mut self, bus_id: &BusIdentifier) -> Result<SeatCount> {
        let count = self.seats.adjust_seat_count(&mut self.registry, bus_id, -1)?;
        self.outbox.push(OutboundSignal::SeatDecrement {
            bus_id: bus_id.clone(),
        });
        Ok(count)
    }

    /// Driver: flip the manual full flag
    pub fn toggle_capacity(&mut self, bus_id: &BusIdentifier) -> Result<SeatCount> {
        let is_full = !self
            .registry
            .get(bus_id)
            .ok_or_else(|| invalid(format!("bus {bus_id} is not tracked")))?
            .marked_full();

        let count = self.seats.set_capacity_flag(&mut self.registry, bus_id, is_full)?;
        self.outbox.push(OutboundSignal::CapacityToggle {
            bus_id: bus_id.clone(),
            is_full,
        });
        Ok(count)
    }

    /// Passenger: ask for a seat on `bus_id`, boarding at `stop_id`.
    ///
    /// One booking per route: a second request is rejected until the first
    /// fails or its bus leaves the route.
    pub fn request_booking(&mut self, bus_id: &BusIdentifier, stop_id: StopId) -> Result<BookingOutcome> {
        if self.route.stop(stop_id).is_none() {
            return Err(TrackerError::Transit(TransitError::StopNotFound {
                route: self.route.id().clone(),
                stop: stop_id,
            }));
        }
        if let Some(held) = &self.booked_on {
            return Err(invalid(format!("already booked on bus {held}")));
        }

        let outcome = self.seats.request_booking(&mut self.registry, bus_id, stop_id)?;
        self.booked_on = Some(bus_id.clone());
        self.outbox.push(OutboundSignal::BookingRequest {
            bus_id: bus_id.clone(),
            stop_id,
        });
        Ok(outcome)
    }

    /// Passenger: start or stop waiting at a stop
    pub fn set_waiting(&mut self, stop_id: StopId, is_waiting: bool) -> Result<u32> {
        if self.route.stop(stop_id).is_none() {
            return Err(invalid(format!("stop {stop_id} is not on route {}", self.route.id())));
        }

        let count = if is_waiting {
            self.waiting.join(stop_id)
        } else {
            self.waiting.leave(stop_id)
        };
        self.outbox.push(OutboundSignal::PassengerWaiting {
            route_id: self.route.id().clone(),
            stop_id,
            is_waiting,
        });
        Ok(count)
    }
}
