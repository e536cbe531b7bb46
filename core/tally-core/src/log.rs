//! Event log view model.
//!
//! Subscribes to the append-only event collection through a filtered,
//! newest-first query, and materializes display-ready log entries. Every
//! feed notification replaces the whole in-memory log (snapshot
//! semantics); ordering comes from the subscription contract and is
//! never re-sorted here.

use std::sync::{Mutex, PoisonError};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tally_feed_protocol::{EventKind, EventRecord, TimestampValue};

use crate::error::FeedError;
use crate::feed::{EventLogFeed, FeedSlot};
use crate::filter::{build_query, DateRange, EventTypeFilter, FilterState};
use crate::timefmt::{normalize, Normalized, LOG_TIME_FALLBACK};

/// Fixed description for entry events.
pub const ENTRY_DESCRIPTION: &str = "Person detected entering";

/// Fixed description for exit events.
pub const EXIT_DESCRIPTION: &str = "Person detected leaving";

/// One display-ready log entry. Immutable once observed.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub id: String,
    pub kind: EventKind,
    pub track_id: i64,
    pub timestamp: Normalized,
    /// Original wire value, retained for the display fallback and
    /// diagnostics.
    pub raw_timestamp: Option<TimestampValue>,
}

impl LogEntry {
    pub fn description(&self) -> &'static str {
        match self.kind {
            EventKind::Entry => ENTRY_DESCRIPTION,
            EventKind::Exit => EXIT_DESCRIPTION,
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self.kind {
            EventKind::Entry => "Entry Event",
            EventKind::Exit => "Exit Event",
        }
    }

    /// Display time relative to `now`, falling back to the log label.
    pub fn time_label(&self, now: DateTime<Utc>) -> String {
        self.timestamp.label(now, LOG_TIME_FALLBACK)
    }
}

/// Maps a raw event record into a log entry.
pub fn map_record(record: EventRecord) -> LogEntry {
    let timestamp = record
        .timestamp
        .as_ref()
        .map(normalize)
        .unwrap_or(Normalized::Unparseable);
    LogEntry {
        kind: record.kind(),
        track_id: record.resolved_track_id(),
        timestamp,
        raw_timestamp: record.timestamp,
        id: record.id,
    }
}

/// Display-ready log state.
#[derive(Debug, Clone, PartialEq)]
pub struct LogView {
    pub entries: Vec<LogEntry>,
    pub loading: bool,
    pub error: Option<String>,
    pub filter: FilterState,
}

impl LogView {
    /// A settled, error-free view with nothing in it. Zero events is a
    /// valid state, not a failure.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && !self.loading && self.error.is_none()
    }

    /// Empty-state copy, parameterized by the active filter labels.
    pub fn empty_notice(&self) -> String {
        format!(
            "No events for {} • {}",
            self.filter.date_range.label(),
            self.filter.event_type.label()
        )
    }

    /// Header line: window label and event count.
    pub fn summary(&self) -> String {
        format!(
            "{} • {} events",
            self.filter.date_range.label(),
            self.entries.len()
        )
    }
}

struct LogState {
    entries: Vec<LogEntry>,
    loading: bool,
    error: Option<String>,
    filter: FilterState,
}

/// View model for the event log feed.
///
/// Holds at most one live subscription; changing the filter tears the
/// old subscription down before the new one is established.
pub struct EventLog {
    feed: Arc<dyn EventLogFeed>,
    state: Arc<Mutex<LogState>>,
    slot: FeedSlot,
}

impl EventLog {
    pub fn new(feed: Arc<dyn EventLogFeed>) -> EventLog {
        EventLog {
            feed,
            state: Arc::new(Mutex::new(LogState {
                entries: Vec::new(),
                loading: true,
                error: None,
                filter: FilterState::default(),
            })),
            slot: FeedSlot::new(),
        }
    }

    /// Establishes the subscription for the current filter.
    pub fn attach(&mut self) {
        self.resubscribe();
    }

    /// Releases the subscription. Idempotent.
    pub fn detach(&mut self) {
        self.slot.clear();
    }

    /// Updates the filter pair and recreates the subscription. The
    /// previous subscription is fully torn down first, so the two never
    /// overlap.
    pub fn set_filter(&mut self, event_type: EventTypeFilter, date_range: DateRange) {
        lock(&self.state).filter = FilterState::new(event_type, date_range);
        self.resubscribe();
    }

    /// Manual re-attempt with the current filter.
    pub fn retry(&mut self) {
        self.resubscribe();
    }

    pub fn filter(&self) -> FilterState {
        lock(&self.state).filter
    }

    pub fn is_attached(&self) -> bool {
        self.slot.is_active()
    }

    pub fn view(&self) -> LogView {
        let guard = lock(&self.state);
        LogView {
            entries: guard.entries.clone(),
            loading: guard.loading,
            error: guard.error.clone(),
            filter: guard.filter,
        }
    }

    /// Reducer for a snapshot delivery; also reachable from tests
    /// without a live feed.
    pub fn on_snapshot(&self, records: Vec<EventRecord>) {
        apply_snapshot(&self.state, records);
    }

    /// Reducer for a subscription-level failure.
    pub fn on_subscription_error(&self, error: &FeedError) {
        apply_error(&self.state, error);
    }

    fn resubscribe(&mut self) {
        let filter = {
            let mut guard = lock(&self.state);
            guard.loading = true;
            guard.error = None;
            guard.filter
        };
        let query = build_query(filter, Utc::now());

        let on_snapshot = Arc::clone(&self.state);
        let on_error = Arc::clone(&self.state);
        let feed = Arc::clone(&self.feed);
        let result = self.slot.replace_with(move || {
            feed.subscribe_events(
                query,
                Arc::new(move |records| apply_snapshot(&on_snapshot, records)),
                Arc::new(move |error| apply_error(&on_error, &error)),
            )
        });

        if let Err(error) = result {
            tracing::warn!(error = %error, "event log subscription setup failed");
            apply_error(&self.state, &error);
        }
    }
}

impl Drop for EventLog {
    fn drop(&mut self) {
        self.slot.clear();
    }
}

fn lock(state: &Mutex<LogState>) -> std::sync::MutexGuard<'_, LogState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn apply_snapshot(state: &Mutex<LogState>, records: Vec<EventRecord>) {
    let entries: Vec<LogEntry> = records.into_iter().map(map_record).collect();
    let mut guard = lock(state);
    guard.entries = entries;
    guard.error = None;
    guard.loading = false;
}

fn apply_error(state: &Mutex<LogState>, error: &FeedError) {
    tracing::warn!(error = %error, "event log feed errored");
    let mut guard = lock(state);
    // Consistent clear-and-flag policy: stale entries are not kept
    // behind the error banner.
    guard.entries.clear();
    guard.error = Some(format!("Failed to load logs: {}", error.cause()));
    guard.loading = false;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryFeed;
    use chrono::TimeZone;

    fn feed_log() -> EventLog {
        EventLog::new(Arc::new(MemoryFeed::new()))
    }

    #[test]
    fn maps_exit_record_with_epoch_timestamp() {
        let record = EventRecord::new("evt-9", EventKind::Exit, TimestampValue::epoch(1700000000))
            .with_track_id(7);
        let entry = map_record(record);

        assert_eq!(entry.kind, EventKind::Exit);
        assert_eq!(entry.track_id, 7);
        assert_eq!(entry.description(), EXIT_DESCRIPTION);
        assert_eq!(entry.kind_label(), "Exit Event");
        assert_eq!(
            entry.timestamp,
            Normalized::Instant(Utc.timestamp_opt(1700000000, 0).unwrap())
        );
    }

    #[test]
    fn maps_legacy_track_id_and_missing_timestamp() {
        let record = EventRecord::from_value(
            "evt-10",
            &serde_json::json!({ "event": "entry", "trueL_id": 4 }),
        );
        let entry = map_record(record);

        assert_eq!(entry.kind, EventKind::Entry);
        assert_eq!(entry.track_id, 4);
        assert_eq!(entry.timestamp, Normalized::Unparseable);
        assert_eq!(entry.time_label(Utc::now()), "Recent activity");
        assert_eq!(entry.description(), ENTRY_DESCRIPTION);
    }

    #[test]
    fn snapshot_replaces_entries_atomically() {
        let log = feed_log();
        log.on_snapshot(vec![
            EventRecord::new("a", EventKind::Entry, TimestampValue::epoch(1_700_000_100)),
            EventRecord::new("b", EventKind::Exit, TimestampValue::epoch(1_700_000_000)),
        ]);
        log.on_snapshot(vec![EventRecord::new(
            "c",
            EventKind::Entry,
            TimestampValue::epoch(1_700_000_200),
        )]);

        let view = log.view();
        assert_eq!(view.entries.len(), 1);
        assert_eq!(view.entries[0].id, "c");
        assert!(!view.loading);
        assert_eq!(view.error, None);
    }

    #[test]
    fn empty_snapshot_is_not_an_error() {
        let log = feed_log();
        log.on_snapshot(Vec::new());

        let view = log.view();
        assert!(view.is_empty());
        assert_eq!(view.error, None);
        assert_eq!(view.empty_notice(), "No events for Today • All Events");
    }

    #[test]
    fn error_clears_entries_and_flags() {
        let log = feed_log();
        log.on_snapshot(vec![EventRecord::new(
            "a",
            EventKind::Entry,
            TimestampValue::epoch(1_700_000_100),
        )]);
        log.on_subscription_error(&FeedError::transport("stream reset"));

        let view = log.view();
        assert!(view.entries.is_empty());
        assert_eq!(
            view.error,
            Some("Failed to load logs: stream reset".to_string())
        );
        assert!(!view.loading);
    }

    #[test]
    fn set_filter_updates_view_filter() {
        let mut log = feed_log();
        log.attach();
        log.set_filter(EventTypeFilter::Exit, DateRange::Last7Days);

        let view = log.view();
        assert_eq!(view.filter.event_type, EventTypeFilter::Exit);
        assert_eq!(view.filter.date_range, DateRange::Last7Days);
        assert_eq!(view.summary(), "Last 7 Days • 0 events");
    }
}
