//! Messages exchanged with the transport layer.
//!
//! Inbound events are tagged by their `event` name; payload fields use the
//! same names the server sends.

use bustrack_transit::{BusIdentifier, BusReport, RouteIdentifier, StopId};
use serde::{Deserialize, Serialize};

use crate::waiting::WaitingCount;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    /// Hidden from passengers; the driver is still sharing
    Full,
    Stopped,
    Disconnected,
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InboundEvent {
    BusUpdate(BusReport),
    AllBusesUpdate {
        #[serde(default)]
        buses: Vec<BusReport>,
    },
    BusRemoved {
        bus_id: BusIdentifier,
        #[serde(default)]
        reason: Option<RemovalReason>,
    },
    BusCountUpdate {
        count: u32,
    },
    SeatCountUpdate {
        bus_id: BusIdentifier,
        occupied_seats: u32,
        #[serde(default)]
        total_seats: Option<u32>,
    },
    CapacityUpdate {
        bus_id: BusIdentifier,
        is_full: bool,
    },
    BookingConfirmed {
        bus_id: BusIdentifier,
        seat_number: u32,
    },
    PriorityQueueAssigned {
        bus_id: BusIdentifier,
        position: u32,
    },
    BookingError {
        message: String,
    },
    WaitingUpdate {
        stop_id: StopId,
        count: u32,
    },
    WaitingStats {
        #[serde(default)]
        counts: Vec<WaitingCount>,
    },
}

impl InboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::BusUpdate(_) => "bus_update",
            Self::AllBusesUpdate { .. } => "all_buses_update",
            Self::BusRemoved { .. } => "bus_removed",
            Self::BusCountUpdate { .. } => "bus_count_update",
            Self::SeatCountUpdate { .. } => "seat_count_update",
            Self::CapacityUpdate { .. } => "capacity_update",
            Self::BookingConfirmed { .. } => "booking_confirmed",
            Self::PriorityQueueAssigned { .. } => "priority_queue_assigned",
            Self::BookingError { .. } => "booking_error",
            Self::WaitingUpdate { .. } => "waiting_update",
            Self::WaitingStats { .. } => "waiting_stats",
        }
    }
}

/// Requests the session wants the transport to deliver
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OutboundSignal {
    SeatIncrement {
        bus_id: BusIdentifier,
    },
    SeatDecrement {
        bus_id: BusIdentifier,
    },
    CapacityToggle {
        bus_id: BusIdentifier,
        is_full: bool,
    },
    BookingRequest {
        bus_id: BusIdentifier,
        stop_id: StopId,
    },
    PassengerWaiting {
        route_id: RouteIdentifier,
        stop_id: StopId,
        is_waiting: bool,
    },
}

/// Last booking answer the server gave this passenger
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BookingStatus {
    Confirmed { bus_id: BusIdentifier, seat_number: u32 },
    Queued { bus_id: BusIdentifier, position: u32 },
    Failed { message: String },
}
