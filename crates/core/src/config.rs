use serde::Deserialize;

use crate::error::{Result, invalid};

/// Tunables of a tracking session.
///
/// Every field has a default, so a config file only needs the values it
/// overrides.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Free-flow bus speed used by the ETA estimate
    pub base_speed_kmh: f64,
    /// Traffic level assumed when the bus did not report one
    pub default_traffic_level: f64,
    pub min_traffic_level: f64,
    pub max_traffic_level: f64,
    /// Seat capacity of a bus that never reported one
    pub default_total_seats: u32,
    /// A bus closer than this to a stop is "at" the stop
    pub at_stop_threshold_km: f64,
    /// Stops closer than this are skipped when looking for the next stop
    pub next_stop_min_distance_km: f64,
    /// Positions kept per bus for speed and direction inference
    pub position_history_len: usize,
    pub max_speed_kmh: f64,
    /// Upper bound on an authoritative distance lookup
    pub lookup_timeout_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            base_speed_kmh: 30.0,
            default_traffic_level: 1.5,
            min_traffic_level: 0.1,
            max_traffic_level: 3.0,
            default_total_seats: 50,
            at_stop_threshold_km: 0.1,
            next_stop_min_distance_km: 0.05,
            position_history_len: 5,
            max_speed_kmh: 100.0,
            lookup_timeout_ms: 3000,
        }
    }
}

impl TrackerConfig {
    pub fn lookup_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.lookup_timeout_ms)
    }

    /// Reject settings the tracker cannot run with.
    ///
    /// Traffic levels must satisfy `0 < min <= default <= max`.
    pub fn validate(&self) -> Result<()> {
        let positive = |name: &str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(invalid(format!("{name} must be a positive number, got {value}")))
            }
        };

        positive("base_speed_kmh", self.base_speed_kmh)?;
        positive("min_traffic_level", self.min_traffic_level)?;
        positive("max_speed_kmh", self.max_speed_kmh)?;

        if !(self.min_traffic_level <= self.default_traffic_level
            && self.default_traffic_level <= self.max_traffic_level)
        {
            return Err(invalid(format!(
                "traffic levels must satisfy min <= default <= max, got {} / {} / {}",
                self.min_traffic_level, self.default_traffic_level, self.max_traffic_level
            )));
        }

        for (name, value) in [
            ("at_stop_threshold_km", self.at_stop_threshold_km),
            ("next_stop_min_distance_km", self.next_stop_min_distance_km),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(format!("{name} must not be negative, got {value}")));
            }
        }

        if self.default_total_seats == 0 {
            return Err(invalid("default_total_seats must be at least 1"));
        }
        if self.lookup_timeout_ms == 0 {
            return Err(invalid("lookup_timeout_ms must be at least 1"));
        }

        Ok(())
    }
}
