//! Chrome DevTools Protocol plumbing.
//!
//! JSON envelopes over a WebSocket transport, with one command in
//! flight at a time. [`CdpSession`] correlates replies by id, buffers
//! events for later waiters and tracks in-flight network requests so a
//! render can wait for the page to go quiet.

// ============================================================================
// Modules
// ============================================================================

/// Message envelopes and parsing.
pub mod message;

/// In-flight request tracking.
pub mod network;

/// Sequential session: call, await event, network idle.
pub mod session;

// ============================================================================
// Re-exports
// ============================================================================

pub use message::{CdpCall, CdpErrorBody, CdpEvent, CdpMessage};
pub use network::NetworkTracker;
pub use session::{CdpSession, Transport, WAIT_FOR_NETWORK};
