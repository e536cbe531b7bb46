//! Feed seams and subscription lifecycle.
//!
//! Each logical feed (the occupancy singleton, the event-log query) is
//! consumed through a trait so the remote service stays an external
//! collaborator. A [`Subscription`] is an owned handle whose teardown is
//! a single idempotent operation; the shared gate guarantees that a
//! cancelled handle never observes another delivery, even when a
//! publisher thread races the cancellation. A [`FeedSlot`] enforces the
//! at-most-one-active-subscription invariant per feed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tally_feed_protocol::{EventRecord, OccupancyRecord, QuerySpec};

use crate::error::{FeedError, Result};

/// Observer for the occupancy singleton. `None` means the record is
/// absent at its fixed key.
pub type OccupancyObserver = Arc<dyn Fn(Option<OccupancyRecord>) + Send + Sync>;

/// Observer for event-log snapshots: the full current result set, in the
/// order the query declares.
pub type SnapshotObserver = Arc<dyn Fn(Vec<EventRecord>) + Send + Sync>;

/// Observer for subscription-level failures.
pub type ErrorObserver = Arc<dyn Fn(FeedError) + Send + Sync>;

/// The occupancy singleton feed.
pub trait OccupancyFeed: Send + Sync {
    /// Establishes a live subscription. Implementations deliver the
    /// current value immediately and on every subsequent change.
    fn subscribe_occupancy(
        &self,
        on_change: OccupancyObserver,
        on_error: ErrorObserver,
    ) -> Result<Subscription>;
}

/// The append-only event collection, consumed through a query.
pub trait EventLogFeed: Send + Sync {
    /// Establishes a live subscription for `query`. Implementations
    /// deliver the full filtered result set immediately and on every
    /// subsequent change.
    fn subscribe_events(
        &self,
        query: QuerySpec,
        on_snapshot: SnapshotObserver,
        on_error: ErrorObserver,
    ) -> Result<Subscription>;
}

/// Delivery gate shared between a subscription handle and its publisher.
///
/// Publishers must check [`SubscriptionGate::is_live`] immediately before
/// invoking an observer; once revoked the gate never reopens, so a
/// handle that cancelled mid-delivery drops the late notification.
#[derive(Debug, Clone)]
pub struct SubscriptionGate {
    live: Arc<AtomicBool>,
}

impl SubscriptionGate {
    pub fn new() -> SubscriptionGate {
        SubscriptionGate {
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn revoke(&self) {
        self.live.store(false, Ordering::SeqCst);
    }
}

impl Default for SubscriptionGate {
    fn default() -> Self {
        SubscriptionGate::new()
    }
}

/// An owned handle to one live subscription.
///
/// Cancellation revokes the gate first, then runs the teardown exactly
/// once; both repeat calls and drop-after-cancel are no-ops.
pub struct Subscription {
    gate: SubscriptionGate,
    teardown: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(gate: SubscriptionGate, teardown: impl FnOnce() + Send + 'static) -> Subscription {
        Subscription {
            gate,
            teardown: Some(Box::new(teardown)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.gate.is_live()
    }

    /// Idempotent teardown: no further deliveries after this returns.
    pub fn cancel(&mut self) {
        self.gate.revoke();
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Holder of at most one active subscription for a logical feed.
#[derive(Default)]
pub struct FeedSlot {
    active: Option<Subscription>,
}

impl FeedSlot {
    pub fn new() -> FeedSlot {
        FeedSlot::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.as_ref().is_some_and(Subscription::is_active)
    }

    /// Tears down the current subscription, then establishes the next
    /// one. The old feed is fully released before `subscribe` runs, so
    /// two subscriptions for the same feed never overlap. A setup
    /// failure leaves the slot empty.
    pub fn replace_with(
        &mut self,
        subscribe: impl FnOnce() -> Result<Subscription>,
    ) -> Result<()> {
        self.clear();
        self.active = Some(subscribe()?);
        Ok(())
    }

    /// Idempotent release of whatever subscription is held.
    pub fn clear(&mut self) {
        if let Some(mut subscription) = self.active.take() {
            subscription.cancel();
        }
    }
}

impl Drop for FeedSlot {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FeedError;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn cancel_runs_teardown_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let counted = Arc::clone(&calls);
        let mut subscription = Subscription::new(SubscriptionGate::new(), move || {
            counted.fetch_add(1, Ordering::SeqCst);
        });

        subscription.cancel();
        subscription.cancel();
        drop(subscription);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_cancels_implicitly() {
        let gate = SubscriptionGate::new();
        let observed = gate.clone();
        drop(Subscription::new(gate, || {}));
        assert!(!observed.is_live());
    }

    #[test]
    fn gate_revocation_is_visible_to_publisher_clone() {
        let gate = SubscriptionGate::new();
        let publisher_side = gate.clone();
        let mut subscription = Subscription::new(gate, || {});

        assert!(publisher_side.is_live());
        subscription.cancel();
        assert!(!publisher_side.is_live());
    }

    #[test]
    fn replace_tears_down_before_subscribing() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut slot = FeedSlot::new();

        let log = Arc::clone(&order);
        slot.replace_with(|| {
            Ok(Subscription::new(SubscriptionGate::new(), move || {
                log.lock().unwrap().push("teardown-first");
            }))
        })
        .unwrap();

        slot.replace_with(|| {
            order.lock().unwrap().push("subscribe-second");
            Ok(Subscription::new(SubscriptionGate::new(), || {}))
        })
        .unwrap();

        assert_eq!(
            order.lock().unwrap().as_slice(),
            ["teardown-first", "subscribe-second"]
        );
    }

    #[test]
    fn failed_replace_leaves_slot_empty() {
        let mut slot = FeedSlot::new();
        slot.replace_with(|| Ok(Subscription::new(SubscriptionGate::new(), || {})))
            .unwrap();

        let result = slot.replace_with(|| Err(FeedError::setup("service unavailable")));

        assert!(result.is_err());
        assert!(!slot.is_active());
    }
}
