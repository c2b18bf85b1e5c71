use anyhow::{bail, Context, Result};
use bustrack_core::{InboundEvent, TrackerConfig};
use bustrack_transit::{Route, RouteIdentifier, Stop};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct StopRecord {
    id: u32,
    name: String,
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize)]
struct RouteRecord {
    id: String,
    #[serde(default)]
    name: Option<String>,
    stops: Vec<StopRecord>,
}

/// One line of an event log
#[derive(Debug, Deserialize)]
pub struct LoggedEvent {
    /// When the event was received; lines without one reuse the previous time
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub event: InboundEvent,
}

/// Read `[{id, name, stops: [{id, name, lat, lng}]}]`
pub fn read_routes(path: &Path) -> Result<Vec<Route>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read routes file: {}", path.display()))?;
    parse_routes(&content).with_context(|| format!("Invalid routes in: {}", path.display()))
}

fn parse_routes(content: &str) -> Result<Vec<Route>> {
    let records: Vec<RouteRecord> = serde_json::from_str(content)?;
    if records.is_empty() {
        bail!("No routes defined");
    }

    records
        .into_iter()
        .map(|record| {
            let stops = record
                .stops
                .into_iter()
                .map(|s| Stop::new(s.id, s.name, s.lat, s.lng))
                .collect();
            let name = record.name.unwrap_or_else(|| record.id.clone());
            Route::new(RouteIdentifier::new(&record.id), name, stops)
                .with_context(|| format!("Route {}", record.id))
        })
        .collect()
}

/// Read `{route_id: [segment_km, ...]}`
pub fn read_segments(path: &Path) -> Result<HashMap<String, Vec<f64>>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read segments file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse segments from: {}", path.display()))
}

pub fn read_config(path: &Path) -> Result<TrackerConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Invalid config: {}", path.display()))
}

fn parse_config(content: &str) -> Result<TrackerConfig> {
    let config: TrackerConfig = serde_json::from_str(content).context("Failed to parse config")?;
    config.validate().context("Unusable config")?;
    Ok(config)
}

/// Read a JSON-lines event log. Blank lines and `#` comments are skipped.
pub fn read_events(path: &Path) -> Result<Vec<LoggedEvent>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read event log: {}", path.display()))?;
    parse_events(&content).with_context(|| format!("Invalid event log: {}", path.display()))
}

fn parse_events(content: &str) -> Result<Vec<LoggedEvent>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(n, line)| {
            serde_json::from_str(line).with_context(|| format!("Line {}", n + 1))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bustrack_core::InboundEvent;

    #[test]
    fn test_parse_routes() {
        let routes = parse_routes(
            r#"[{"id": "23", "name": "Thirupallai - Periyar", "stops": [
                {"id": 1, "name": "Thirupallai", "lat": 9.972, "lng": 78.138},
                {"id": 2, "name": "Periyar", "lat": 9.916, "lng": 78.114}
            ]}]"#,
        )
        .unwrap();

        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].name(), "Thirupallai - Periyar");
        assert_eq!(routes[0].last_stop().name.as_ref(), "Periyar");
    }

    #[test]
    fn test_route_without_stops_is_rejected() {
        let err = parse_routes(r#"[{"id": "23", "stops": []}]"#).unwrap_err();
        assert!(format!("{err:#}").contains("Route 23"));
        assert!(parse_routes("[]").is_err());
    }

    #[test]
    fn test_parse_config_validates() {
        let config = parse_config(r#"{"base_speed_kmh": 25.0}"#).unwrap();
        assert_eq!(config.base_speed_kmh, 25.0);

        let err = parse_config(r#"{"min_traffic_level": 3.0, "max_traffic_level": 2.0}"#).unwrap_err();
        assert!(format!("{err:#}").contains("Unusable config"));
        assert!(parse_config(r#"{"lookup_timeout_ms": 0}"#).is_err());
    }

    #[test]
    fn test_parse_events_skips_comments() {
        let events = parse_events(
            r#"
# driver A starts sharing
{"at": "2025-10-19T08:00:00Z", "event": "bus_update", "bus_id": "A", "lat": 9.97, "lng": 78.13}

{"event": "bus_count_update", "count": 1}
"#,
        )
        .unwrap();

        assert_eq!(events.len(), 2);
        assert!(events[0].at.is_some());
        assert!(matches!(events[0].event, InboundEvent::BusUpdate(_)));
        assert!(events[1].at.is_none());
        assert_eq!(events[1].event, InboundEvent::BusCountUpdate { count: 1 });
    }

    #[test]
    fn test_bad_event_line_is_reported() {
        let err = parse_events("{\"event\": \"bus_count_update\", \"count\": 1}\n{\"event\": \"nope\"}").unwrap_err();
        assert_eq!(err.to_string(), "Line 2");
    }
}
