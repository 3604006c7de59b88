//! # Providers
//!
//! Adapters for the upstream reservation systems. Each adapter turns requested
//! days into fetch windows, pulls availability and catalog data, and normalizes
//! it into the shared cell and catalog types.

/// Shared value types
mod types;
pub use types::*;

/// Upstream error taxonomy
mod error;
pub use error::*;

/// Day bucketing strategies
pub mod bucketing;

/// Shared HTTP client, JSON decoding and retry helpers
pub mod http;

/// The adapter capability trait
mod provider;
pub use provider::*;

/// recreation.gov adapter
mod recreation_gov;
pub use recreation_gov::*;

/// ReserveCalifornia adapter
mod reserve_california;
pub use reserve_california::*;

/// Provider lookup by key
mod registry;
pub use registry::*;
