//! Travel-time estimate from distance and traffic.
//!
//! This is a declared approximation: `speed = base / traffic`. A distance
//! from the routing service replaces the distance fed in here, never the
//! formula itself.

use crate::config::TrackerConfig;
use crate::error::{Result, invalid};

pub const BASE_SPEED_KMH: f64 = 30.0;

/// Minutes to cover `distance_km` at the base speed slowed by `traffic_level`.
///
/// `traffic_level` must be a positive finite number; zero would divide by zero.
pub fn estimate_eta_minutes(distance_km: f64, traffic_level: f64) -> Result<f64> {
    eta_minutes_at(BASE_SPEED_KMH, distance_km, traffic_level)
}

fn eta_minutes_at(base_speed_kmh: f64, distance_km: f64, traffic_level: f64) -> Result<f64> {
    if !traffic_level.is_finite() || traffic_level <= 0.0 {
        return Err(invalid(format!("traffic level must be positive, got {traffic_level}")));
    }
    if !distance_km.is_finite() || distance_km < 0.0 {
        return Err(invalid(format!("distance must be non-negative, got {distance_km}")));
    }

    let speed = base_speed_kmh / traffic_level;
    Ok((distance_km / speed) * 60.0)
}

/// ETA estimate bound to a session's configuration.
///
/// Unlike [`estimate_eta_minutes`] it clamps the traffic level into the
/// configured range instead of rejecting it, so a stray 0 from a slider
/// still yields an estimate.
#[derive(Clone, Copy, Debug)]
pub struct EtaEstimator {
    base_speed_kmh: f64,
    default_traffic: f64,
    min_traffic: f64,
    max_traffic: f64,
}

impl EtaEstimator {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            base_speed_kmh: config.base_speed_kmh,
            default_traffic: config.default_traffic_level,
            min_traffic: config.min_traffic_level,
            max_traffic: config.max_traffic_level,
        }
    }

    pub fn clamp_traffic(&self, traffic_level: Option<f64>) -> f64 {
        match traffic_level {
            // f64::clamp panics when min > max
            Some(level) if level.is_finite() => level.max(self.min_traffic).min(self.max_traffic),
            _ => self.default_traffic,
        }
    }

    pub fn estimate(&self, distance_km: f64, traffic_level: Option<f64>) -> Result<f64> {
        eta_minutes_at(self.base_speed_kmh, distance_km, self.clamp_traffic(traffic_level))
    }
}

impl Default for EtaEstimator {
    fn default() -> Self {
        Self::new(&TrackerConfig::default())
    }
}
