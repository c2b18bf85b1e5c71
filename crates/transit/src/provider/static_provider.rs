//! In-memory route provider.
//!
//! Stores every route with a per-route R-tree of its stops for proximity
//! queries (at-stop detection, nearby stops).

use std::collections::HashMap;
use std::sync::Arc;

use geo::Point;

use crate::identifiers::*;
use crate::models::{traits::*, types::*};
use crate::spatial::index::StopIndex;

/// In-memory route provider with spatial indexing
///
/// This type is cheap to clone since all data is stored in `Arc`s.
#[derive(Clone, Default)]
pub struct StaticRouteProvider {
    routes: Vec<Arc<Route>>,
    route_map: HashMap<RouteIdentifier, Arc<Route>>,
    stop_indices: HashMap<RouteIdentifier, Arc<StopIndex>>,
}

impl StaticRouteProvider {
    /// Create a new empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Build provider from already validated routes
    ///
    /// A later route with the same id replaces an earlier one.
    pub fn from_routes(routes: Vec<Route>) -> Self {
        let mut provider = Self::new();
        for route in routes {
            provider.insert(route);
        }
        provider
    }

    pub fn insert(&mut self, route: Route) {
        let route = Arc::new(route);
        let index = Arc::new(StopIndex::build(&route));

        self.routes.retain(|existing| existing.id() != route.id());
        self.routes.push(route.clone());
        self.stop_indices.insert(route.id().clone(), index);
        self.route_map.insert(route.id().clone(), route);
    }
}

impl RouteProvider for StaticRouteProvider {
    fn route(&self, id: &RouteIdentifier) -> Option<Arc<Route>> {
        self.route_map.get(id).cloned()
    }

    fn all_routes(&self) -> Vec<Arc<Route>> {
        self.routes.clone()
    }

    fn stops_within(&self, id: &RouteIdentifier, point: Point, radius_km: f64) -> Vec<Stop> {
        self.stop_indices
            .get(id)
            .map(|index| {
                index
                    .within(point, radius_km)
                    .into_iter()
                    .map(|node| node.stop.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> StaticRouteProvider {
        let route = Route::new(
            RouteIdentifier::new("23"),
            "Thirupallai - Periyar",
            vec![
                Stop::new(1, "Thirupallai", 9.9720, 78.1380),
                Stop::new(2, "Iyer Bungalow", 9.9650, 78.1330),
                Stop::new(3, "Periyar", 9.9160, 78.1120),
            ],
        )
        .unwrap();

        StaticRouteProvider::from_routes(vec![route])
    }

    #[test]
    fn test_empty_provider() {
        let provider = StaticRouteProvider::new();
        assert_eq!(provider.all_routes().len(), 0);
        assert!(provider.route(&RouteIdentifier::new("23")).is_none());
    }

    #[test]
    fn test_route_stops_lookup() {
        let provider = provider();

        let stops = provider.route_stops(&RouteIdentifier::new("23")).unwrap();
        assert_eq!(stops.len(), 3);
        assert_eq!(&*stops[0].name, "Thirupallai");

        let missing = provider.route_stops(&RouteIdentifier::new("nope"));
        assert!(matches!(missing, Err(TransitError::RouteNotFound(_))));
    }

    #[test]
    fn test_stops_within_and_nearest() {
        let provider = provider();
        let id = RouteIdentifier::new("23");

        let at_first = provider.stops_within(&id, Point::new(78.1381, 9.9721), 0.1);
        assert_eq!(at_first.len(), 1);
        assert_eq!(at_first[0].id, StopId(1));

        let (nearest, km) = provider.nearest_stop(&id, Point::new(78.1125, 9.9165)).unwrap();
        assert_eq!(nearest.id, StopId(3));
        assert!(km < 0.1);
    }

    #[test]
    fn test_insert_replaces_route() {
        let mut provider = provider();
        provider.insert(
            Route::new(
                RouteIdentifier::new("23"),
                "Short",
                vec![Stop::new(9, "Only", 9.9, 78.1)],
            )
            .unwrap(),
        );

        assert_eq!(provider.all_routes().len(), 1);
        assert_eq!(provider.route_stops(&RouteIdentifier::new("23")).unwrap().len(), 1);
    }
}
