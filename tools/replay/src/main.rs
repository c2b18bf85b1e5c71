use anyhow::{bail, Context, Result};
use bustrack_core::distance::StopDistanceTable;
use bustrack_core::{InboundEvent, TrackerConfig, TrackingSession, WaitingState};
use bustrack_transit::{RouteIdentifier, RouteProvider, StaticRouteProvider, StopId};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

mod input;
mod output;

use input::{read_config, read_events, read_routes, read_segments};
use output::{format_no_bus, format_report, format_waiting};

#[derive(Parser, Debug)]
#[command(
    name = "bustrack-replay",
    author,
    version,
    about = "Replay a recorded bus event log through a tracking session",
    long_about = "Loads route definitions and a JSON-lines log of realtime events, feeds \
                  the events to a tracking session for one route and prints what a \
                  passenger waiting at the chosen stop would be shown after each event.\n\n\
                  With a segments file the reported distances follow the road; without \
                  one they are straight-line approximations."
)]
struct Args {
    /// Routes JSON file
    #[arg(short, long)]
    routes: PathBuf,

    /// Event log, one JSON event per line
    #[arg(short, long)]
    events: PathBuf,

    /// Tracker config JSON file (defaults for every missing field)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Route to track (defaults to the first route in the file)
    #[arg(long)]
    route: Option<String>,

    /// Stop the passenger waits at (defaults to the route's first stop)
    #[arg(short, long)]
    stop: Option<u32>,

    /// Segment distances JSON file: {"route_id": [km, ...]}
    #[arg(long)]
    segments: Option<PathBuf>,

    /// Verbose output (show debug messages)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if args.verbose { "debug" } else { "info" }),
    )
    .format_timestamp(None)
    .init();

    let config = match &args.config {
        Some(path) => read_config(path)?,
        None => TrackerConfig::default(),
    };

    let routes = read_routes(&args.routes)?;
    log::info!("Loaded {} routes from {}", routes.len(), args.routes.display());

    let route_id = match &args.route {
        Some(id) => RouteIdentifier::new(id),
        None => routes[0].id().clone(),
    };
    let provider = Arc::new(StaticRouteProvider::from_routes(routes));
    let route = provider
        .route(&route_id)
        .with_context(|| format!("Route {route_id} not found in {}", args.routes.display()))?;

    let waiting = match args.stop {
        Some(id) => {
            let stop = StopId(id);
            if route.stop(stop).is_none() {
                bail!("Stop {stop} is not on route {route_id}");
            }
            WaitingState::at(stop)
        }
        None => WaitingState::default(),
    };

    let mut session = TrackingSession::new(provider.clone(), &route_id, config)
        .with_context(|| format!("Cannot track route {route_id}"))?;

    if let Some(path) = &args.segments {
        let segments = read_segments(path)?;
        let mut table = StopDistanceTable::new();
        for (id, lengths) in &segments {
            let Some(route) = provider.route(&RouteIdentifier::new(id)) else {
                log::warn!("Segments for unknown route {id}, skipping");
                continue;
            };
            table
                .insert(&route, lengths)
                .with_context(|| format!("Invalid segments for route {id}"))?;
        }
        session = session.with_distance_table(Arc::new(table));
    }

    let events = read_events(&args.events)?;
    log::info!("Replaying {} events on route {}", events.len(), route_id);

    if let Some(stop) = waiting.stop_id {
        session.set_waiting(stop, true)?;
    }

    let mut clock = Utc::now();
    let mut rejected = 0usize;

    for logged in events {
        clock = logged.at.unwrap_or(clock);
        let shows_buses = !matches!(
            logged.event,
            InboundEvent::BookingConfirmed { .. }
                | InboundEvent::PriorityQueueAssigned { .. }
                | InboundEvent::BookingError { .. }
                | InboundEvent::WaitingUpdate { .. }
                | InboundEvent::WaitingStats { .. }
                | InboundEvent::BusCountUpdate { .. }
        );
        let name = logged.event.name();

        if let Err(err) = session.handle_at(logged.event, clock) {
            log::warn!("Rejected {name}: {err}");
            rejected += 1;
            continue;
        }

        if !shows_buses {
            log::debug!("Handled {name}");
            continue;
        }

        let report = match session.table_waypoints() {
            Some(waypoints) => session.refresh_eta(&waiting, &waypoints).await,
            None => session.select(&waiting).report,
        };

        let line = match report {
            Some(report) => format_report(&report),
            None => format_no_bus(session.route()),
        };
        println!("[{}] {line}", clock.format("%H:%M:%S"));
    }

    println!("waiting: {}", format_waiting(session.route(), &session.waiting_counts()));
    if let Some(status) = session.booking_status() {
        println!("booking: {}", serde_json::to_string(status)?);
    }

    for signal in session.drain_outbound() {
        log::debug!("Outbound: {}", serde_json::to_string(&signal)?);
    }

    if rejected > 0 {
        log::warn!("{rejected} events rejected");
    }

    Ok(())
}
