//! Feed simulator for the Tally reactive core.
//!
//! Stands in for the remote service and the presentation layer during
//! development: seeds the in-memory feed, signs a session in through the
//! auth gate, attaches both view models, then publishes scripted
//! entry/exit traffic with deliberately mixed timestamp shapes. With
//! `--drop-feeds` it injects a mid-run transport failure and lets the
//! reconnect supervisors recover both feeds.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tally_core::{
    AuthGate, DateRange, EventLog, EventTypeFilter, MemoryAuth, MemoryFeed, OccupancyMonitor,
    OccupancyView, ReconnectSupervisor, RetryPolicy, SessionInfo,
};
use tally_feed_protocol::{
    EventKind, EventRecord, OccupancyRecord, TimestampValue, EVENT_COLLECTION,
    OCCUPANCY_RECORD_KEY,
};

#[derive(Parser)]
#[command(
    name = "tally-feed-sim",
    about = "Drives the Tally view models against scripted occupancy traffic"
)]
struct Args {
    /// Number of entry/exit events to publish.
    #[arg(long, default_value_t = 24)]
    events: u32,

    /// Delay between published events, in milliseconds.
    #[arg(long, default_value_t = 100)]
    interval_ms: u64,

    /// Inject a transport failure halfway through and let the
    /// supervisors reconnect.
    #[arg(long)]
    drop_feeds: bool,
}

fn main() {
    init_logging();
    let args = Args::parse();

    let feed = Arc::new(MemoryFeed::new());
    let auth = MemoryAuth::new();

    let session_watch = auth.observe_session(Arc::new(|session| match session {
        Some(info) => info!(user = %info.user_id, "session active"),
        None => info!("signed out"),
    }));
    let _session_watch = match session_watch {
        Ok(subscription) => subscription,
        Err(err) => {
            warn!(error = %err, "auth observation failed");
            std::process::exit(1);
        }
    };
    auth.sign_in(SessionInfo::new("operator").with_email("ops@example.com"));

    let monitor = Arc::new(Mutex::new(OccupancyMonitor::new(feed.clone())));
    with_lock(&monitor, OccupancyMonitor::attach);

    let log = Arc::new(Mutex::new(EventLog::new(feed.clone())));
    with_lock(&log, |log| {
        log.set_filter(EventTypeFilter::All, DateRange::AllTime)
    });

    let mut supervisors = spawn_supervisors(&monitor, &log);

    info!(
        record = OCCUPANCY_RECORD_KEY,
        collection = EVENT_COLLECTION,
        events = args.events,
        interval_ms = args.interval_ms,
        drop_feeds = args.drop_feeds,
        "simulation started"
    );

    let mut count: u32 = 0;
    for index in 0..args.events {
        if args.drop_feeds && index == args.events / 2 {
            warn!("injecting transport failure");
            feed.fail_feeds("injected transport drop");
        }

        // Net ramp-up: two entries for every exit.
        let kind = if index % 3 == 2 {
            EventKind::Exit
        } else {
            EventKind::Entry
        };
        count = match kind {
            EventKind::Entry => count + 1,
            EventKind::Exit => count.saturating_sub(1),
        };

        let stamp = scripted_timestamp(index);
        let track_id = i64::from(index % 7 + 1);
        let record = if index % 5 == 4 {
            // Legacy writer shape: raw body with the misspelled track field.
            EventRecord::from_value(
                format!("sim-{index}"),
                &serde_json::json!({
                    "event": kind.as_wire(),
                    "timestamp": stamp.to_value(),
                    "trueL_id": track_id,
                }),
            )
        } else {
            EventRecord::new(format!("sim-{index}"), kind, stamp.clone()).with_track_id(track_id)
        };
        if let Err(err) = feed.append_event(record) {
            warn!(error = %err, "rejected scripted event");
            continue;
        }
        feed.publish_occupancy(OccupancyRecord {
            count: i64::from(count),
            last_updated: Some(stamp),
        });

        report(&monitor, &log);
        thread::sleep(Duration::from_millis(args.interval_ms));
    }

    // Let a dropped run settle before the final report.
    if args.drop_feeds {
        thread::sleep(Duration::from_millis(500));
        report(&monitor, &log);
    }

    for supervisor in &mut supervisors {
        supervisor.shutdown();
    }
    if let Err(err) = auth.sign_out() {
        warn!(error = %err, "sign-out failed");
    }
    with_lock(&log, EventLog::detach);
    with_lock(&monitor, OccupancyMonitor::detach);
    info!("simulation finished");
}

fn spawn_supervisors(
    monitor: &Arc<Mutex<OccupancyMonitor>>,
    log: &Arc<Mutex<EventLog>>,
) -> Vec<ReconnectSupervisor> {
    let policy = RetryPolicy {
        base: Duration::from_millis(100),
        factor: 2,
        max_delay: Duration::from_secs(2),
        max_attempts: 5,
    };

    let health = Arc::clone(monitor);
    let retrier = Arc::clone(monitor);
    let monitor_supervisor = ReconnectSupervisor::spawn(
        policy,
        move || matches!(with_lock(&health, |m| m.view()), OccupancyView::Errored { .. }),
        move || with_lock(&retrier, OccupancyMonitor::retry),
    );

    let health = Arc::clone(log);
    let retrier = Arc::clone(log);
    let log_supervisor = ReconnectSupervisor::spawn(
        policy,
        move || with_lock(&health, |l| l.view().error.is_some()),
        move || with_lock(&retrier, EventLog::retry),
    );

    vec![monitor_supervisor, log_supervisor]
}

/// Rotates through the timestamp shapes observed in production data.
fn scripted_timestamp(index: u32) -> TimestampValue {
    let now = Utc::now();
    match index % 4 {
        0 => TimestampValue::Native(now),
        1 => TimestampValue::Text(now.to_rfc3339()),
        2 => TimestampValue::Text(now.format("%Y/%m/%dT%H:%M:%S").to_string()),
        _ => TimestampValue::epoch(now.timestamp()),
    }
}

fn report(monitor: &Arc<Mutex<OccupancyMonitor>>, log: &Arc<Mutex<EventLog>>) {
    match with_lock(monitor, |m| m.view()) {
        OccupancyView::Connecting => info!("occupancy: connecting"),
        OccupancyView::Live(snapshot) => {
            let now = Utc::now();
            info!(
                count = snapshot.count,
                percentage = snapshot.percentage,
                status = snapshot.status.label(),
                updated = %snapshot.last_updated.label(now),
                "occupancy"
            );
        }
        OccupancyView::Errored { message } => warn!(%message, "occupancy errored"),
    }

    let view = with_lock(log, |l| l.view());
    match &view.error {
        Some(message) => warn!(%message, "log errored"),
        None => info!(summary = %view.summary(), "log"),
    }
}

fn with_lock<T, R>(shared: &Arc<Mutex<T>>, operate: impl FnOnce(&mut T) -> R) -> R {
    let mut guard = shared.lock().unwrap_or_else(PoisonError::into_inner);
    operate(&mut guard)
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
