//! Log filter state and query construction.
//!
//! Filters are pure client-local state; any change invalidates the
//! active log subscription. The date math takes an explicit `now` so the
//! windows stay testable.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tally_feed_protocol::{EventKind, QuerySpec};

/// Event-kind narrowing for the log feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTypeFilter {
    #[default]
    All,
    Entry,
    Exit,
}

impl EventTypeFilter {
    pub fn label(self) -> &'static str {
        match self {
            EventTypeFilter::All => "All Events",
            EventTypeFilter::Entry => "Entries",
            EventTypeFilter::Exit => "Exits",
        }
    }

    /// The equality predicate this filter contributes, if any.
    pub fn kind(self) -> Option<EventKind> {
        match self {
            EventTypeFilter::All => None,
            EventTypeFilter::Entry => Some(EventKind::Entry),
            EventTypeFilter::Exit => Some(EventKind::Exit),
        }
    }
}

/// Date window selection for the log feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateRange {
    #[default]
    Today,
    Last7Days,
    Last30Days,
    AllTime,
}

impl DateRange {
    pub fn label(self) -> &'static str {
        match self {
            DateRange::Today => "Today",
            DateRange::Last7Days => "Last 7 Days",
            DateRange::Last30Days => "Last 30 Days",
            DateRange::AllTime => "All Time",
        }
    }
}

/// The combined filter pair driving the log subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilterState {
    pub event_type: EventTypeFilter,
    pub date_range: DateRange,
}

impl FilterState {
    pub fn new(event_type: EventTypeFilter, date_range: DateRange) -> FilterState {
        FilterState {
            event_type,
            date_range,
        }
    }
}

/// A resolved date window. `start` is absent for `AllTime`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: DateTime<Utc>,
}

/// Resolves a range against `now`: midnight..now for `Today`, rolling
/// windows for the day-count ranges, unbounded below for `AllTime`.
pub fn compute_date_range(range: DateRange, now: DateTime<Utc>) -> DateWindow {
    let start = match range {
        DateRange::Today => {
            let midnight = now
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .map(|naive| naive.and_utc())
                .unwrap_or(now);
            Some(midnight)
        }
        DateRange::Last7Days => Some(now - Duration::days(7)),
        DateRange::Last30Days => Some(now - Duration::days(30)),
        DateRange::AllTime => None,
    };
    DateWindow { start, end: now }
}

/// Builds the server-side query for a filter pair: newest-first order,
/// lower timestamp bound when the window has one, kind equality when the
/// type filter narrows.
pub fn build_query(filter: FilterState, now: DateTime<Utc>) -> QuerySpec {
    let window = compute_date_range(filter.date_range, now);
    let mut query = QuerySpec::newest_first();
    if let Some(start) = window.start {
        query = query.with_since(start);
    }
    if let Some(kind) = filter.event_type.kind() {
        query = query.with_kind(kind);
    }
    query
}
