//! Route data models, types, and traits.

pub mod traits;
pub mod types;

// Re-exports for convenience
pub use traits::RouteProvider;
pub use types::{BusReport, Direction, Result, Route, Stop, TransitError};
