//! Decision core of the bus tracker.
//!
//! Given the buses currently known on a route and a passenger's stop, the
//! core picks the bus to report on, estimates its distance and ETA, tracks
//! its progress along the route and arbitrates seats. All state lives in a
//! [`TrackingSession`] owned by whoever drives the transport.

pub mod capacity;
pub mod config;
pub mod distance;
pub mod error;
pub mod eta;
pub mod events;
pub mod motion;
pub mod progress;
pub mod registry;
pub mod selector;
pub mod session;
pub mod waiting;

pub use config::TrackerConfig;
pub use error::{Result, TrackerError};
pub use events::{InboundEvent, OutboundSignal};
pub use selector::WaitingState;
pub use session::{EtaReport, LookupTicket, Selection, TrackingSession};

// Re-export transit from the transit crate
pub use bustrack_transit as transit;
