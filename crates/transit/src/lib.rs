//! # bustrack-transit
//!
//! Static route data for live bus tracking.
//!
//! ## Features
//!
//! - **Routes and stops**: ordered stop lists, direction-aware terminals
//! - **Spatial queries**: haversine distances and R-tree stop proximity
//! - **Pluggable networking**: implement your own bus feed and routing lookups
//!
//! ## Example
//!
//! ```
//! use bustrack_transit::prelude::*;
//! use geo::Point;
//!
//! let route = Route::new(
//!     RouteIdentifier::new("23"),
//!     "Thirupallai - Periyar",
//!     vec![
//!         Stop::new(1, "Thirupallai", 9.9720, 78.1380),
//!         Stop::new(2, "Periyar", 9.9160, 78.1120),
//!     ],
//! )
//! .unwrap();
//!
//! let provider = StaticRouteProvider::from_routes(vec![route]);
//!
//! // Which stops is a bus standing at?
//! let bus = Point::new(78.1381, 9.9721);
//! let here = provider.stops_within(&RouteIdentifier::new("23"), bus, 0.1);
//! assert_eq!(here.len(), 1);
//! ```

pub mod identifiers;
pub mod models;
pub mod network;
pub mod provider;
pub mod spatial;

// Re-exports for convenience
pub mod prelude {
    pub use crate::identifiers::*;
    pub use crate::models::{traits::*, types::*};
    pub use crate::network::traits::*;
    pub use crate::provider::static_provider::StaticRouteProvider;
    pub use crate::spatial::queries::haversine_distance_km;
}

pub use prelude::*;
