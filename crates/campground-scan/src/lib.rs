//! # Campground Scan
//!
//! The availability monitoring engine: plans upstream fetches from active
//! subscriptions, diffs fresh availability against the stored snapshot, and
//! notifies subscribers on rising edges. Also hosts the adhoc refresh path,
//! catalog sync and the periodic digest.

/// Types for scan operations
mod scan_types;
pub use scan_types::*;

/// Persistence contract and in-memory store
mod store;
pub use store::*;

/// Shared handles
mod context;
pub use context::*;

/// Per-pair mutual exclusion
mod locks;
pub use locks::*;

/// Subscription grouping and bucketing
pub mod planner;

/// Snapshot diffing and subscription matching
pub mod diff;

/// Fetch, diff, persist and notify for one pair
mod refresh;
pub use refresh::*;

/// Polling loop
mod executor;
pub use executor::*;

/// On-demand refreshes
mod adhoc;
pub use adhoc::*;

/// Catalog sync jobs
mod catalog_sync;
pub use catalog_sync::*;

/// Periodic digest
mod digest;
pub use digest::*;
