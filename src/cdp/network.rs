//! In-flight network request tracking.
//!
//! Pages routinely reference stylesheets, fonts and images that must
//! finish loading before a print is faithful. The tracker keeps a table
//! of requests the browser has announced but not yet completed, fed by
//! the `Network.*` events of an enabled page session.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::warn;

// ============================================================================
// NetworkTracker
// ============================================================================

/// Tracks requests between `Network.requestWillBeSent` and their
/// terminal `Network.loadingFinished` / `Network.loadingFailed` event.
#[derive(Debug, Default)]
pub struct NetworkTracker {
    /// Pending requests keyed by request id, storing the announcement
    /// params so failures can be reported with the original URL.
    requests: FxHashMap<String, Value>,
}

impl NetworkTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one event into the tracker.
    ///
    /// Returns `true` when the event was a network lifecycle event and
    /// has been consumed, `false` when it is none of the tracker's
    /// business and should be handled elsewhere.
    pub fn observe(&mut self, method: &str, params: &Value) -> bool {
        match method {
            "Network.requestWillBeSent" => {
                if let Some(request_id) = request_id(params) {
                    self.requests.insert(request_id.to_string(), params.clone());
                } else {
                    warn!(method, "Network event without request id");
                }
                true
            }
            "Network.loadingFinished" => {
                if let Some(request_id) = request_id(params) {
                    self.requests.remove(request_id);
                } else {
                    warn!(method, "Network event without request id");
                }
                true
            }
            "Network.loadingFailed" => {
                if let Some(request_id) = request_id(params) {
                    if let Some(request) = self.requests.remove(request_id) {
                        // Resolved outside the macro; `Value` inside a
                        // tracing field expression is shadowed by the
                        // `tracing::field::Value` trait.
                        let url = request
                            .pointer("/request/url")
                            .and_then(Value::as_str)
                            .unwrap_or("<unknown>")
                            .to_string();
                        let error = params
                            .get("errorText")
                            .and_then(Value::as_str)
                            .unwrap_or("<unknown>")
                            .to_string();
                        warn!(url = %url, error = %error, "Unable to complete request");
                    }
                } else {
                    warn!(method, "Network event without request id");
                }
                true
            }
            _ => false,
        }
    }

    /// Returns `true` when no announced request is still in flight.
    #[inline]
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.requests.is_empty()
    }

    /// Number of requests still in flight.
    #[inline]
    #[must_use]
    pub fn pending(&self) -> usize {
        self.requests.len()
    }
}

fn request_id(params: &Value) -> Option<&str> {
    params.get("requestId").and_then(Value::as_str)
}

// ============================================================================
// Tests
// ============================================================================
