//! R-tree nodes for spatial indexing.
//!
//! Wraps route stops with geometric data for proximity queries.
//!
//! ## Two-Stage Filtering
//!
//! Proximity queries use a two-stage filtering approach:
//! 1. **R-tree filter**: Euclidean distance in degrees, with a radius widened
//!    for the query latitude so no stop inside the true radius is dropped
//! 2. **Haversine filter**: exact great-circle distance on the survivors

use geo::Point;
use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::models::types::{Route, Stop};
use crate::spatial::queries::{haversine_distance_km, search_radius_degrees};

// ============================================================================
// Stop Spatial Node
// ============================================================================

#[derive(Clone, Debug)]
pub struct StopNode {
    /// Position of the stop in its route's order
    pub index: usize,
    pub stop: Stop,
    point: [f64; 2],
}

impl StopNode {
    pub fn new(index: usize, stop: Stop) -> Self {
        let point = [stop.location.x(), stop.location.y()];
        Self { index, stop, point }
    }
}

impl RTreeObject for StopNode {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.point)
    }
}

impl PointDistance for StopNode {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.point[0] - point[0];
        let dy = self.point[1] - point[1];
        dx * dx + dy * dy
    }
}

// ============================================================================
// Per-route stop index
// ============================================================================

#[derive(Clone, Debug)]
pub struct StopIndex {
    tree: RTree<StopNode>,
}

impl StopIndex {
    pub fn build(route: &Route) -> Self {
        let nodes = route
            .stops()
            .iter()
            .enumerate()
            .map(|(index, stop)| StopNode::new(index, stop.clone()))
            .collect();

        Self {
            tree: RTree::bulk_load(nodes),
        }
    }

    /// Stops within `radius_km` of `point`, in route order
    pub fn within(&self, point: Point, radius_km: f64) -> Vec<&StopNode> {
        if radius_km <= 0.0 || !radius_km.is_finite() {
            return Vec::new();
        }

        let radius_deg = search_radius_degrees(radius_km, point.y());

        let mut hits: Vec<&StopNode> = self
            .tree
            .locate_within_distance([point.x(), point.y()], radius_deg * radius_deg)
            .filter(|node| haversine_distance_km(point, node.stop.location) <= radius_km)
            .collect();

        hits.sort_by_key(|node| node.index);
        hits
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}
