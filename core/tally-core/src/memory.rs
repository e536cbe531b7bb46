//! In-memory stand-in for the remote document service.
//!
//! Implements the feed and auth seams faithfully enough to drive the
//! view models: singleton replacement, an append-only event table with
//! server-side query evaluation (newest-first order, lower bound, kind
//! equality), push delivery honoring cancellation gates, and injectable
//! failures. Backs the simulator binary and the test suites.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tally_feed_protocol::{EventRecord, FieldError, OccupancyRecord, QuerySpec};

use crate::auth::{AuthGate, SessionInfo, SessionObserver};
use crate::error::{FeedError, Result};
use crate::feed::{
    ErrorObserver, EventLogFeed, OccupancyFeed, OccupancyObserver, SnapshotObserver, Subscription,
    SubscriptionGate,
};
use crate::timefmt::normalize;

struct OccupancySubscriber {
    id: u64,
    gate: SubscriptionGate,
    on_change: OccupancyObserver,
    on_error: ErrorObserver,
}

struct EventSubscriber {
    id: u64,
    gate: SubscriptionGate,
    query: QuerySpec,
    on_snapshot: SnapshotObserver,
    on_error: ErrorObserver,
}

#[derive(Default)]
struct FeedTables {
    occupancy: Option<OccupancyRecord>,
    events: Vec<EventRecord>,
    occupancy_subs: Vec<OccupancySubscriber>,
    event_subs: Vec<EventSubscriber>,
    next_id: u64,
    setup_failure: Option<String>,
}

/// In-process feed service.
#[derive(Default)]
pub struct MemoryFeed {
    tables: Arc<Mutex<FeedTables>>,
}

impl MemoryFeed {
    pub fn new() -> MemoryFeed {
        MemoryFeed::default()
    }

    /// Replaces the singleton record and notifies live subscribers.
    pub fn publish_occupancy(&self, record: OccupancyRecord) {
        let listeners = {
            let mut tables = self.lock();
            tables.occupancy = Some(record.clone());
            occupancy_listeners(&tables)
        };
        for (gate, on_change) in listeners {
            if gate.is_live() {
                on_change(Some(record.clone()));
            }
        }
    }

    /// Removes the singleton record; subscribers observe the absence.
    pub fn clear_occupancy(&self) {
        let listeners = {
            let mut tables = self.lock();
            tables.occupancy = None;
            occupancy_listeners(&tables)
        };
        for (gate, on_change) in listeners {
            if gate.is_live() {
                on_change(None);
            }
        }
    }

    /// Appends an event record and pushes a fresh filtered snapshot to
    /// every live log subscriber.
    pub fn append_event(&self, record: EventRecord) -> std::result::Result<(), FieldError> {
        record.validate()?;
        let deliveries = {
            let mut tables = self.lock();
            tables.events.push(record);
            tables
                .event_subs
                .iter()
                .map(|sub| {
                    (
                        sub.gate.clone(),
                        Arc::clone(&sub.on_snapshot),
                        evaluate_query(&tables.events, &sub.query),
                    )
                })
                .collect::<Vec<_>>()
        };
        for (gate, on_snapshot, snapshot) in deliveries {
            if gate.is_live() {
                on_snapshot(snapshot);
            }
        }
        Ok(())
    }

    /// Fails every live subscription with a transport error. The
    /// failure is terminal to those attempts: the subscribers are
    /// dropped and must resubscribe.
    pub fn fail_feeds(&self, cause: &str) {
        let (occupancy_errs, event_errs) = {
            let mut tables = self.lock();
            let occupancy = tables
                .occupancy_subs
                .drain(..)
                .map(|sub| (sub.gate, sub.on_error))
                .collect::<Vec<_>>();
            let events = tables
                .event_subs
                .drain(..)
                .map(|sub| (sub.gate, sub.on_error))
                .collect::<Vec<_>>();
            (occupancy, events)
        };
        for (gate, on_error) in occupancy_errs.into_iter().chain(event_errs) {
            if gate.is_live() {
                on_error(FeedError::transport(cause));
            }
        }
    }

    /// Makes subsequent subscribe calls fail synchronously with a setup
    /// error until cleared with `None`.
    pub fn set_setup_failure(&self, cause: Option<&str>) {
        self.lock().setup_failure = cause.map(str::to_string);
    }

    /// Number of occupancy subscriptions whose gate is still live.
    pub fn live_occupancy_subscribers(&self) -> usize {
        self.lock()
            .occupancy_subs
            .iter()
            .filter(|sub| sub.gate.is_live())
            .count()
    }

    /// Number of log subscriptions whose gate is still live.
    pub fn live_event_subscribers(&self) -> usize {
        self.lock()
            .event_subs
            .iter()
            .filter(|sub| sub.gate.is_live())
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, FeedTables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn occupancy_listeners(tables: &FeedTables) -> Vec<(SubscriptionGate, OccupancyObserver)> {
    tables
        .occupancy_subs
        .iter()
        .map(|sub| (sub.gate.clone(), Arc::clone(&sub.on_change)))
        .collect()
}

/// Server-side query evaluation: kind equality, lower timestamp bound,
/// newest-first order. Records whose timestamp matches no known shape
/// sort to the end; the inequality bound excludes them, mirroring how
/// the service skips documents without a comparable field.
fn evaluate_query(events: &[EventRecord], query: &QuerySpec) -> Vec<EventRecord> {
    let mut matched: Vec<(Option<chrono::DateTime<chrono::Utc>>, EventRecord)> = events
        .iter()
        .filter(|record| query.kind.map_or(true, |kind| record.kind() == kind))
        .map(|record| {
            let instant = record
                .timestamp
                .as_ref()
                .and_then(|raw| normalize(raw).instant());
            (instant, record.clone())
        })
        .filter(|(instant, _)| match query.since {
            Some(since) => instant.is_some_and(|at| at >= since),
            None => true,
        })
        .collect();

    matched.sort_by(|(a, _), (b, _)| b.cmp(a));
    matched.into_iter().map(|(_, record)| record).collect()
}

impl OccupancyFeed for MemoryFeed {
    fn subscribe_occupancy(
        &self,
        on_change: OccupancyObserver,
        on_error: ErrorObserver,
    ) -> Result<Subscription> {
        let (id, gate, initial) = {
            let mut tables = self.lock();
            if let Some(cause) = &tables.setup_failure {
                return Err(FeedError::setup(cause.clone()));
            }
            let id = tables.next_id;
            tables.next_id += 1;
            let gate = SubscriptionGate::new();
            tables.occupancy_subs.push(OccupancySubscriber {
                id,
                gate: gate.clone(),
                on_change: Arc::clone(&on_change),
                on_error,
            });
            (id, gate, tables.occupancy.clone())
        };

        // Initial delivery happens outside the table lock so observers
        // are free to take their own locks.
        if gate.is_live() {
            on_change(initial);
        }

        let tables = Arc::clone(&self.tables);
        Ok(Subscription::new(gate, move || {
            let mut tables = tables.lock().unwrap_or_else(PoisonError::into_inner);
            tables.occupancy_subs.retain(|sub| sub.id != id);
        }))
    }
}

impl EventLogFeed for MemoryFeed {
    fn subscribe_events(
        &self,
        query: QuerySpec,
        on_snapshot: SnapshotObserver,
        on_error: ErrorObserver,
    ) -> Result<Subscription> {
        let (id, gate, initial) = {
            let mut tables = self.lock();
            if let Some(cause) = &tables.setup_failure {
                return Err(FeedError::setup(cause.clone()));
            }
            let id = tables.next_id;
            tables.next_id += 1;
            let gate = SubscriptionGate::new();
            let initial = evaluate_query(&tables.events, &query);
            tables.event_subs.push(EventSubscriber {
                id,
                gate: gate.clone(),
                query,
                on_snapshot: Arc::clone(&on_snapshot),
                on_error,
            });
            (id, gate, initial)
        };

        if gate.is_live() {
            on_snapshot(initial);
        }

        let tables = Arc::clone(&self.tables);
        Ok(Subscription::new(gate, move || {
            let mut tables = tables.lock().unwrap_or_else(PoisonError::into_inner);
            tables.event_subs.retain(|sub| sub.id != id);
        }))
    }
}

struct AuthSubscriber {
    id: u64,
    gate: SubscriptionGate,
    observer: SessionObserver,
}

#[derive(Default)]
struct AuthTables {
    session: Option<SessionInfo>,
    subs: Vec<AuthSubscriber>,
    next_id: u64,
}

/// In-process auth collaborator.
#[derive(Default)]
pub struct MemoryAuth {
    tables: Arc<Mutex<AuthTables>>,
}

impl MemoryAuth {
    pub fn new() -> MemoryAuth {
        MemoryAuth::default()
    }

    pub fn sign_in(&self, session: SessionInfo) {
        self.notify(Some(session));
    }

    pub fn current_session(&self) -> Option<SessionInfo> {
        self.lock().session.clone()
    }

    fn notify(&self, session: Option<SessionInfo>) {
        let listeners = {
            let mut tables = self.lock();
            tables.session = session.clone();
            tables
                .subs
                .iter()
                .map(|sub| (sub.gate.clone(), Arc::clone(&sub.observer)))
                .collect::<Vec<_>>()
        };
        for (gate, observer) in listeners {
            if gate.is_live() {
                observer(session.clone());
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, AuthTables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AuthGate for MemoryAuth {
    fn observe_session(&self, observer: SessionObserver) -> Result<Subscription> {
        let (id, gate, current) = {
            let mut tables = self.lock();
            let id = tables.next_id;
            tables.next_id += 1;
            let gate = SubscriptionGate::new();
            tables.subs.push(AuthSubscriber {
                id,
                gate: gate.clone(),
                observer: Arc::clone(&observer),
            });
            (id, gate, tables.session.clone())
        };

        if gate.is_live() {
            observer(current);
        }

        let tables = Arc::clone(&self.tables);
        Ok(Subscription::new(gate, move || {
            let mut tables = tables.lock().unwrap_or_else(PoisonError::into_inner);
            tables.subs.retain(|sub| sub.id != id);
        }))
    }

    fn sign_out(&self) -> Result<()> {
        self.notify(None);
        Ok(())
    }
}
