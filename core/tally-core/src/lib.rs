//! # tally-core
//!
//! Reactive core for the Tally occupancy monitor: derives display-ready
//! view state from two live remote feeds — a singleton occupancy record
//! and an append-only entry/exit event collection.
//!
//! ## Design Principles
//!
//! - **Synchronous**: no async runtime dependency. Feeds push via
//!   callbacks from their own threads; clients wrap with async if needed.
//! - **Single writer per view**: each view model owns its derived state
//!   and is updated only from its own subscription callbacks.
//! - **Graceful degradation**: malformed timestamps and missing fields
//!   become display fallbacks, never errors or panics.
//! - **One subscription per feed**: lifecycle is owned-handle RAII;
//!   parameter changes tear down before resubscribing, and a cancelled
//!   handle never observes another delivery.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use tally_core::{EventLog, MemoryFeed, OccupancyMonitor};
//!
//! let feed = Arc::new(MemoryFeed::new());
//! let mut monitor = OccupancyMonitor::new(feed.clone());
//! let mut log = EventLog::new(feed);
//! monitor.attach();
//! log.attach();
//! ```

// Public modules
pub mod auth;
pub mod error;
pub mod feed;
pub mod filter;
pub mod log;
pub mod memory;
pub mod occupancy;
pub mod reconnect;
pub mod status;
pub mod timefmt;

// Re-export commonly used items at crate root
pub use auth::{AuthGate, SessionInfo, SessionObserver};
pub use error::{FeedError, Result};
pub use feed::{
    ErrorObserver, EventLogFeed, FeedSlot, OccupancyFeed, OccupancyObserver, SnapshotObserver,
    Subscription, SubscriptionGate,
};
pub use filter::{build_query, compute_date_range, DateRange, DateWindow, EventTypeFilter, FilterState};
pub use log::{EventLog, LogEntry, LogView};
pub use memory::{MemoryAuth, MemoryFeed};
pub use occupancy::{
    LastUpdated, OccupancyMonitor, OccupancySnapshot, OccupancyView, CONNECTION_ERROR_MESSAGE,
    NO_DATA_MESSAGE,
};
pub use reconnect::{ReconnectSupervisor, RetryPolicy};
pub use status::{derive_status, occupancy_percentage, OccupancyStatus, StatusColor, ROOM_CAPACITY};
pub use timefmt::{format_relative, normalize, Normalized};
