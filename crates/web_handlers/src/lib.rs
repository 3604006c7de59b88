//! # Web Handlers for the Availability Engine
//!
//! HTTP entry points for on-demand refreshes, catalog maintenance and health.

/// On-demand refresh handlers
mod adhoc_handlers;
pub use adhoc_handlers::*;

/// Catalog maintenance and health handlers
mod admin_handlers;
pub use admin_handlers::*;

#[cfg(test)]
mod test_support;
