//! # Notification Services
//!
//! Chat delivery for availability alerts and the periodic digest. Messages are
//! queued and delivered by a bounded pool of workers with retry, so callers
//! never wait on the chat backend.

/// Event, digest and error types
mod types;
pub use types::*;

/// Chat transports
mod chat;
pub use chat::*;

/// Message rendering
pub mod message;

/// Queue and worker pool
mod notifier;
pub use notifier::*;
