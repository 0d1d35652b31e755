//! Raw WebSocket client transport (RFC 6455).
//!
//! The only transport the browser's DevTools endpoint offers is a plain
//! WebSocket, so this module implements the whole of it: frame codec,
//! upgrade handshake, optional permessage-deflate, fragmentation and
//! reassembly. Layering, bottom up:
//!
//! 1. [`FrameCodec`]: wire frames, masking, length variants
//! 2. [`DeflateContext`]: per-message compression (RFC 7692)
//! 3. [`handshake`]: HTTP Upgrade exchange and accept validation
//! 4. [`WsConnection`]: duplex [`Message`] channel over the above

// ============================================================================
// Modules
// ============================================================================

/// Per-message compression extension (permessage-deflate).
pub mod compression;

/// Connection: connect/send/receive/close over one socket.
pub mod connection;

/// Frame-level encoding and decoding.
pub mod frame;

/// Upgrade handshake (client role).
pub mod handshake;

/// Logical message unit.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use compression::{DeflateConfig, DeflateContext, Role};
pub use connection::{ConnectOptions, WsConnection};
pub use frame::{Frame, FrameCodec, Opcode};
pub use handshake::{HandshakeOutcome, accept_key, generate_key};
pub use message::Message;
