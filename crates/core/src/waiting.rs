//! Passengers waiting at each stop of the session's route.

use std::collections::HashMap;

use bustrack_transit::{Route, StopId};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitingCount {
    pub stop_id: StopId,
    pub count: u32,
}

#[derive(Debug, Default)]
pub struct WaitingBoard {
    counts: HashMap<StopId, u32>,
}

impl WaitingBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&mut self, stop_id: StopId) -> u32 {
        let count = self.counts.entry(stop_id).or_default();
        *count += 1;
        *count
    }

    /// Never drops below zero
    pub fn leave(&mut self, stop_id: StopId) -> u32 {
        let count = self.counts.entry(stop_id).or_default();
        *count = count.saturating_sub(1);
        *count
    }

    pub fn set(&mut self, stop_id: StopId, count: u32) {
        self.counts.insert(stop_id, count);
    }

    /// Replace every count with an upstream snapshot
    pub fn replace(&mut self, counts: &[WaitingCount]) {
        self.counts = counts.iter().map(|c| (c.stop_id, c.count)).collect();
    }

    pub fn count(&self, stop_id: StopId) -> u32 {
        self.counts.get(&stop_id).copied().unwrap_or(0)
    }

    /// Non-zero counts in route order. Stops not on `route` are left out.
    pub fn counts(&self, route: &Route) -> Vec<WaitingCount> {
        route
            .stops()
            .iter()
            .map(|stop| WaitingCount {
                stop_id: stop.id,
                count: self.count(stop.id),
            })
            .filter(|c| c.count > 0)
            .collect()
    }

    pub fn total(&self) -> u32 {
        self.counts.values().sum()
    }
}
