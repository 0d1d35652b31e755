//! CDP message envelopes.
//!
//! Outbound calls are `{id, method, params}` JSON objects. Inbound
//! messages come in three shapes: `{id, result}` and `{id, error}` are
//! replies to a call, `{method, params}` is an event. Anything else is
//! a protocol error.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// CdpCall
// ============================================================================

/// An outbound command envelope.
#[derive(Debug, Clone, Serialize)]
pub struct CdpCall {
    /// Correlation id, monotonically increasing per session.
    pub id: u64,

    /// Domain-qualified method, e.g. `Page.printToPDF`.
    pub method: String,

    /// Method parameters; an empty object when the method takes none.
    pub params: Value,
}

impl CdpCall {
    /// Creates a call envelope, defaulting absent params to `{}`.
    #[must_use]
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        let params = if params.is_null() {
            Value::Object(serde_json::Map::new())
        } else {
            params
        };
        Self {
            id,
            method: method.into(),
            params,
        }
    }
}

// ============================================================================
// CdpEvent
// ============================================================================

/// An unsolicited event pushed by the browser.
#[derive(Debug, Clone, PartialEq)]
pub struct CdpEvent {
    /// Domain-qualified event name.
    pub method: String,
    /// Event parameters.
    pub params: Value,
}

// ============================================================================
// CdpErrorBody
// ============================================================================

/// The `error` object of a failed reply.
#[derive(Debug, Clone, Deserialize)]
pub struct CdpErrorBody {
    /// CDP error code.
    pub code: i64,
    /// CDP error message.
    pub message: String,
}

// ============================================================================
// CdpMessage
// ============================================================================

/// One parsed inbound message.
#[derive(Debug, Clone)]
pub enum CdpMessage {
    /// Reply to a call, successful or failed.
    Reply {
        /// Correlation id of the call this answers.
        id: u64,
        /// Result payload; `{}` on error replies.
        result: Value,
        /// Error object, if the call failed.
        error: Option<CdpErrorBody>,
    },
    /// Unsolicited event.
    Event(CdpEvent),
}

impl CdpMessage {
    /// Parses one inbound payload.
    ///
    /// # Errors
    ///
    /// - [`Error::Cdp`] for a bare error object without an id
    /// - [`Error::Protocol`] for any unknown message shape
    pub fn parse(payload: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(payload)?;

        if let Some(method) = value.get("method").and_then(Value::as_str) {
            let params = value.get("params").cloned().unwrap_or(Value::Null);
            return Ok(Self::Event(CdpEvent {
                method: method.to_string(),
                params,
            }));
        }

        if let Some(id) = value.get("id").and_then(Value::as_u64) {
            let error = match value.get("error") {
                Some(body) => Some(serde_json::from_value::<CdpErrorBody>(body.clone())?),
                None => None,
            };
            let result = value.get("result").cloned().unwrap_or(Value::Null);
            return Ok(Self::Reply { id, result, error });
        }

        if let Some(body) = value.get("error") {
            let error: CdpErrorBody = serde_json::from_value(body.clone())?;
            return Err(Error::cdp(error.code, error.message));
        }

        Err(Error::protocol(format!(
            "Unknown response received: {payload}"
        )))
    }
}

// ============================================================================
// Tests
// ============================================================================
