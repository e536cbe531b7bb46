//! Occupancy view model.
//!
//! Owns the derived state for the occupancy singleton: current count,
//! percentage of capacity, safety tier, and the last-updated stamp. The
//! model is the sole writer of its state and is updated only from its
//! own subscription callbacks.

use std::sync::{Mutex, PoisonError};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tally_feed_protocol::OccupancyRecord;

use crate::error::FeedError;
use crate::feed::{FeedSlot, OccupancyFeed};
use crate::status::{derive_status, occupancy_percentage, OccupancyStatus};
use crate::timefmt::{normalize, Normalized, CARD_TIME_FALLBACK, CARD_TIME_MISSING};

/// Error card copy when the singleton record is absent.
pub const NO_DATA_MESSAGE: &str = "No data available";

/// Error card copy for subscription-level failures.
pub const CONNECTION_ERROR_MESSAGE: &str = "Database connection error";

/// The last-updated stamp carried on a live snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastUpdated {
    /// The record carried no `last_updated` field.
    Missing,
    /// Normalized instant.
    At(DateTime<Utc>),
    /// Present but matched no known timestamp shape.
    Unparseable,
}

impl LastUpdated {
    /// Display label relative to `now`.
    pub fn label(self, now: DateTime<Utc>) -> String {
        match self {
            LastUpdated::Missing => CARD_TIME_MISSING.to_string(),
            LastUpdated::At(instant) => Normalized::Instant(instant).label(now, CARD_TIME_FALLBACK),
            LastUpdated::Unparseable => CARD_TIME_FALLBACK.to_string(),
        }
    }
}

/// Display-ready occupancy state derived from the latest record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupancySnapshot {
    pub count: u32,
    pub percentage: u32,
    pub status: OccupancyStatus,
    pub last_updated: LastUpdated,
}

/// The occupancy feed's view state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OccupancyView {
    Connecting,
    Live(OccupancySnapshot),
    Errored { message: String },
}

struct MonitorState {
    view: OccupancyView,
    refreshing: bool,
}

/// View model for the occupancy singleton feed.
///
/// Holds exactly one live subscription while attached and guarantees its
/// release on [`detach`](OccupancyMonitor::detach) or drop.
pub struct OccupancyMonitor {
    feed: Arc<dyn OccupancyFeed>,
    state: Arc<Mutex<MonitorState>>,
    slot: FeedSlot,
}

impl OccupancyMonitor {
    pub fn new(feed: Arc<dyn OccupancyFeed>) -> OccupancyMonitor {
        OccupancyMonitor {
            feed,
            state: Arc::new(Mutex::new(MonitorState {
                view: OccupancyView::Connecting,
                refreshing: false,
            })),
            slot: FeedSlot::new(),
        }
    }

    /// Establishes the live subscription. Re-entering from `Live` or
    /// `Errored` passes through `Connecting` again, as on a remount.
    /// Setup failures land on the error path instead of propagating.
    pub fn attach(&mut self) {
        lock(&self.state).view = OccupancyView::Connecting;

        let on_change = Arc::clone(&self.state);
        let on_error = Arc::clone(&self.state);
        let feed = Arc::clone(&self.feed);
        let result = self.slot.replace_with(move || {
            feed.subscribe_occupancy(
                Arc::new(move |record| apply_record(&on_change, record)),
                Arc::new(move |error| apply_error(&on_error, &error)),
            )
        });

        if let Err(error) = result {
            tracing::warn!(error = %error, "occupancy subscription setup failed");
            apply_error(&self.state, &error);
        }
    }

    /// Releases the subscription. Idempotent.
    pub fn detach(&mut self) {
        self.slot.clear();
    }

    /// Manual re-attempt after an error: tears down whatever is left and
    /// attaches again.
    pub fn retry(&mut self) {
        self.attach();
    }

    /// Marks a user-requested refresh. Purely a transient UI flag; the
    /// live subscription already guarantees eventual consistency, so no
    /// re-fetch happens. Cleared by the next delivery.
    pub fn request_refresh(&self) {
        lock(&self.state).refreshing = true;
    }

    pub fn is_refreshing(&self) -> bool {
        lock(&self.state).refreshing
    }

    pub fn is_attached(&self) -> bool {
        self.slot.is_active()
    }

    pub fn view(&self) -> OccupancyView {
        lock(&self.state).view.clone()
    }

    /// Reducer for a record delivery; also reachable from tests without
    /// a live feed.
    pub fn on_record_change(&self, record: Option<OccupancyRecord>) {
        apply_record(&self.state, record);
    }

    /// Reducer for a subscription-level failure.
    pub fn on_subscription_error(&self, error: &FeedError) {
        apply_error(&self.state, error);
    }
}

impl Drop for OccupancyMonitor {
    fn drop(&mut self) {
        self.slot.clear();
    }
}

fn lock(state: &Mutex<MonitorState>) -> std::sync::MutexGuard<'_, MonitorState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn apply_record(state: &Mutex<MonitorState>, record: Option<OccupancyRecord>) {
    let mut guard = lock(state);
    guard.refreshing = false;
    match record {
        None => {
            guard.view = OccupancyView::Errored {
                message: NO_DATA_MESSAGE.to_string(),
            };
        }
        Some(record) => {
            let count = record.count.max(0) as u32;
            let last_updated = match &record.last_updated {
                None => LastUpdated::Missing,
                Some(raw) => match normalize(raw) {
                    Normalized::Instant(instant) => LastUpdated::At(instant),
                    Normalized::Unparseable => LastUpdated::Unparseable,
                },
            };
            guard.view = OccupancyView::Live(OccupancySnapshot {
                count,
                percentage: occupancy_percentage(count),
                status: derive_status(count),
                last_updated,
            });
        }
    }
}

fn apply_error(state: &Mutex<MonitorState>, error: &FeedError) {
    let message = match error {
        FeedError::NotFound => NO_DATA_MESSAGE,
        FeedError::Transport(_) | FeedError::Setup(_) => CONNECTION_ERROR_MESSAGE,
    };
    tracing::warn!(error = %error, "occupancy feed errored");
    let mut guard = lock(state);
    guard.refreshing = false;
    guard.view = OccupancyView::Errored {
        message: message.to_string(),
    };
}
