//! Logical WebSocket messages.
//!
//! A [`Message`] is the unit callers send and receive; it is reassembled
//! from one or more frames sharing a single non-continuation opcode.

// ============================================================================
// Imports
// ============================================================================

use super::frame::Opcode;

// ============================================================================
// Message
// ============================================================================

/// A reassembled WebSocket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// UTF-8 text message.
    Text(String),
    /// Binary message.
    Binary(Vec<u8>),
    /// Close message with optional status code and reason.
    Close {
        /// Close status code, if the payload carried one.
        code: Option<u16>,
        /// Close reason text.
        reason: String,
    },
    /// Ping control message.
    Ping(Vec<u8>),
    /// Pong control message.
    Pong(Vec<u8>),
}

impl Message {
    /// Creates a text message.
    #[inline]
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text(content.into())
    }

    /// Returns the opcode carried by the first frame of this message.
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Text(_) => Opcode::Text,
            Self::Binary(_) => Opcode::Binary,
            Self::Close { .. } => Opcode::Close,
            Self::Ping(_) => Opcode::Ping,
            Self::Pong(_) => Opcode::Pong,
        }
    }

    /// Returns `true` for data messages (text or binary).
    #[inline]
    #[must_use]
    pub fn is_data(&self) -> bool {
        matches!(self, Self::Text(_) | Self::Binary(_))
    }

    /// Consumes the message, returning its payload bytes.
    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        match self {
            Self::Text(text) => text.into_bytes(),
            Self::Binary(payload) | Self::Ping(payload) | Self::Pong(payload) => payload,
            Self::Close { code, reason } => {
                let mut payload = Vec::with_capacity(2 + reason.len());
                if let Some(code) = code {
                    payload.extend_from_slice(&code.to_be_bytes());
                    payload.extend_from_slice(reason.as_bytes());
                }
                payload
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
