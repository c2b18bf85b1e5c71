use bustrack_core::waiting::WaitingCount;
use bustrack_core::EtaReport;
use bustrack_transit::Route;

/// One passenger-facing line for a selection
pub fn format_report(report: &EtaReport) -> String {
    let accuracy = if report.approximate { " (approx)" } else { "" };
    let speed = match report.speed_kmh {
        Some(kmh) => format!("{kmh:.0} km/h"),
        None => "-- km/h".to_string(),
    };

    format!(
        "bus {} -> {}: {:.2} km{accuracy}, ETA {} | {} → {} ({}) {} | {} | {} seats free",
        report.bus_id,
        report.stop.name,
        report.distance_km,
        format_minutes(report.eta_minutes),
        report.progress.start_label,
        report.progress.end_label,
        report.direction,
        report.progress.percent_label(),
        speed,
        report.available_seats,
    )
}

pub fn format_no_bus(route: &Route) -> String {
    format!("no buses on route {}", route.id())
}

/// "<1 min", "7 min" or "1 h 05 min"
pub fn format_minutes(minutes: f64) -> String {
    if minutes < 1.0 {
        return "<1 min".to_string();
    }

    let rounded = minutes.round() as u64;
    if rounded < 60 {
        format!("{rounded} min")
    } else {
        format!("{} h {:02} min", rounded / 60, rounded % 60)
    }
}

pub fn format_waiting(route: &Route, counts: &[WaitingCount]) -> String {
    if counts.is_empty() {
        return "nobody waiting".to_string();
    }

    counts
        .iter()
        .map(|c| {
            let name = route
                .stop(c.stop_id)
                .map(|stop| stop.name.to_string())
                .unwrap_or_else(|| c.stop_id.to_string());
            format!("{name}: {}", c.count)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use bustrack_core::progress::Progress;
    use bustrack_transit::{Direction, RouteIdentifier, Stop, StopId};

    fn route() -> Route {
        Route::new(
            RouteIdentifier::new("23"),
            "23",
            vec![
                Stop::new(1, "Thirupallai", 9.972, 78.138),
                Stop::new(2, "Periyar", 9.916, 78.114),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_format_minutes() {
        assert_eq!(format_minutes(0.4), "<1 min");
        assert_eq!(format_minutes(7.4), "7 min");
        assert_eq!(format_minutes(65.0), "1 h 05 min");
    }

    #[test]
    fn test_format_report() {
        let report = EtaReport {
            bus_id: "A".into(),
            stop: route().last_stop().clone(),
            distance_km: 2.4,
            eta_minutes: 7.2,
            approximate: true,
            speed_kmh: Some(28.4),
            direction: Direction::Backward,
            available_seats: 12,
            progress: Progress {
                direction: Direction::Backward,
                start_label: "Periyar".into(),
                end_label: "Thirupallai".into(),
                progress_pct: Some(42.0),
                distance_from_start_km: None,
            },
        };

        assert_eq!(
            format_report(&report),
            "bus A -> Periyar: 2.40 km (approx), ETA 7 min | Periyar → Thirupallai (backward) 42.0% | 28 km/h | 12 seats free"
        );
    }

    #[test]
    fn test_format_waiting() {
        let route = route();
        assert_eq!(format_waiting(&route, &[]), "nobody waiting");
        assert_eq!(
            format_waiting(
                &route,
                &[
                    WaitingCount { stop_id: StopId(2), count: 3 },
                    WaitingCount { stop_id: StopId(7), count: 1 },
                ]
            ),
            "Periyar: 3, 7: 1"
        );
    }
}
