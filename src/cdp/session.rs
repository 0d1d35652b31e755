//! CDP session with strictly sequential command execution.
//!
//! The browser pushes events whenever it pleases, but this session
//! issues commands one at a time: a call writes its envelope and then
//! reads from the wire until the reply with the matching id arrives.
//! Events read along the way are either consumed by the network tracker
//! or buffered, and [`CdpSession::await_event`] replays that buffer
//! before touching the wire again, so no waiter misses an event that
//! arrived early.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::message::{CdpCall, CdpEvent, CdpMessage};
use super::network::NetworkTracker;
use crate::error::{Error, Result};
use crate::websocket::{Message, WsConnection};

// ============================================================================
// Constants
// ============================================================================

/// Sentinel event name: resolved once the network tracker reports no
/// request in flight, instead of matching a wire event by name.
pub const WAIT_FOR_NETWORK: &str = "wait-for-network";

// ============================================================================
// Transport
// ============================================================================

/// Text-message transport a session drives.
///
/// The production implementation is [`WsConnection`]; tests substitute
/// a scripted transport.
#[async_trait]
pub trait Transport: Send {
    /// Sends one text message.
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Receives the next text message.
    async fn receive_text(&mut self) -> Result<String>;

    /// Closes the transport.
    async fn close(&mut self) -> Result<()>;
}

#[async_trait]
impl Transport for WsConnection {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.send(Message::text(text)).await
    }

    async fn receive_text(&mut self) -> Result<String> {
        loop {
            match self.receive().await? {
                Message::Text(text) => return Ok(text),
                Message::Binary(payload) => {
                    return String::from_utf8(payload)
                        .map_err(|e| Error::protocol(format!("Invalid UTF-8 payload: {e}")));
                }
                Message::Close { .. } => return Err(Error::ConnectionClosed),
                // Control messages are answered inside the connection.
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        WsConnection::close(self).await
    }
}

// ============================================================================
// CdpSession
// ============================================================================

/// One DevTools session over a dedicated transport.
#[derive(Debug)]
pub struct CdpSession<T: Transport> {
    transport: T,
    next_id: u64,
    /// Events read while waiting for something else, in arrival order.
    buffered: VecDeque<CdpEvent>,
    network: NetworkTracker,
}

impl<T: Transport> CdpSession<T> {
    /// Wraps a transport in a fresh session. Call ids start at 1.
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            next_id: 1,
            buffered: VecDeque::new(),
            network: NetworkTracker::new(),
        }
    }

    /// Issues one command and blocks until its reply arrives.
    ///
    /// Events received in between are tracked or buffered. Replies
    /// whose id does not match the outstanding call are logged and
    /// skipped. An error reply for the outstanding call surfaces as
    /// [`Error::Cdp`].
    pub async fn call(&mut self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id;
        self.next_id += 1;

        let call = CdpCall::new(id, method, params);
        debug!(method, id, "Transmitting CDP call");
        self.transport.send_text(serde_json::to_string(&call)?).await?;

        loop {
            match self.read_message().await? {
                CdpMessage::Event(event) => self.register_event(event),
                CdpMessage::Reply { id: got, result, error } if got == id => {
                    if let Some(error) = error {
                        return Err(Error::cdp(error.code, error.message));
                    }
                    debug!(method, "Received CDP result");
                    return Ok(result);
                }
                CdpMessage::Reply { id: got, .. } => {
                    warn!(expected = id, got, "Reply for unexpected call id; skipping");
                }
            }
        }
    }

    /// Waits for a named event, or for network idle when `name` is
    /// [`WAIT_FOR_NETWORK`].
    ///
    /// Buffered events are replayed in arrival order before the wire is
    /// read again; a replayed match is removed from the buffer. When
    /// `expected` is given, an event only matches if its params carry
    /// every key of `expected` with an equal value. Returns the params
    /// of the matching event, or `Value::Null` for the network
    /// sentinel.
    pub async fn await_event(&mut self, name: &str, expected: Option<&Value>) -> Result<Value> {
        if name == WAIT_FOR_NETWORK {
            if self.network.is_idle() {
                return Ok(Value::Null);
            }
            debug!(pending = self.network.pending(), "Awaiting pending network requests");
            // Buffered events cannot change the request table; only the
            // wire can, so replay is skipped for the sentinel.
            return self.await_network_idle().await;
        }

        debug!(event = name, "Awaiting CDP event");

        // Replay phase: events that arrived while a call was in flight.
        let mut position = 0;
        while position < self.buffered.len() {
            let event = &self.buffered[position];
            if event.method == name && params_cover(&event.params, expected) {
                let event = self
                    .buffered
                    .remove(position)
                    .ok_or_else(|| Error::protocol("Event buffer corrupted"))?;
                return Ok(event.params);
            }
            position += 1;
        }

        // Wire phase. Network bookkeeping happens before the match
        // test so a directly awaited lifecycle event still updates the
        // request table.
        loop {
            match self.read_message().await? {
                CdpMessage::Event(event) => {
                    debug!(method = %event.method, "Received CDP event");
                    let consumed = self.network.observe(&event.method, &event.params);
                    if event.method == name && params_cover(&event.params, expected) {
                        return Ok(event.params);
                    }
                    if !consumed {
                        self.buffered.push_back(event);
                    }
                }
                CdpMessage::Reply { id, .. } => {
                    warn!(id, "Reply with no outstanding call; skipping");
                }
            }
        }
    }

    /// Read from the wire until the network tracker drains.
    async fn await_network_idle(&mut self) -> Result<Value> {
        loop {
            match self.read_message().await? {
                CdpMessage::Event(event) => {
                    self.register_event(event);
                    if self.network.is_idle() {
                        return Ok(Value::Null);
                    }
                }
                CdpMessage::Reply { id, .. } => {
                    warn!(id, "Reply with no outstanding call; skipping");
                }
            }
        }
    }

    /// Access to the request table, mainly for diagnostics.
    #[inline]
    #[must_use]
    pub fn network(&self) -> &NetworkTracker {
        &self.network
    }

    /// Closes the underlying transport.
    pub async fn close(&mut self) -> Result<()> {
        self.transport.close().await
    }

    /// Test access to the underlying transport.
    #[cfg(test)]
    pub(crate) fn transport_ref(&self) -> &T {
        &self.transport
    }

    async fn read_message(&mut self) -> Result<CdpMessage> {
        let payload = self.transport.receive_text().await?;
        CdpMessage::parse(&payload)
    }

    fn register_event(&mut self, event: CdpEvent) {
        debug!(method = %event.method, "Received CDP event");
        if !self.network.observe(&event.method, &event.params) {
            self.buffered.push_back(event);
        }
    }
}

/// Returns `true` when `params` carries every key of `expected` with an
/// equal value. `None` matches anything.
fn params_cover(params: &Value, expected: Option<&Value>) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    match expected.as_object() {
        Some(expected) => expected
            .iter()
            .all(|(key, value)| params.get(key) == Some(value)),
        None => params == expected,
    }
}

// ============================================================================
// Test support
// ============================================================================


// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::testing::ScriptedTransport;
    use super::*;

    use serde_json::json;

    #[tokio::test]
    async fn test_call_returns_matching_reply() {
        let transport = ScriptedTransport::new([
            r#"{"method":"Page.frameStartedLoading","params":{"frameId":"f1"}}"#,
            r#"{"id":1,"result":{"frameId":"f1"}}"#,
        ]);
        let mut session = CdpSession::new(transport);

        let result = session
            .call("Page.navigate", json!({"url": "http://localhost/"}))
            .await
            .expect("call");
        assert_eq!(result["frameId"], "f1");
    }

    #[tokio::test]
    async fn test_call_ids_are_monotonic() {
        let transport =
            ScriptedTransport::new([r#"{"id":1,"result":{}}"#, r#"{"id":2,"result":{}}"#]);
        let mut session = CdpSession::new(transport);

        session.call("Page.enable", json!({})).await.expect("first");
        session.call("Log.enable", json!({})).await.expect("second");

        let first: Value = serde_json::from_str(&session.transport.outbound[0]).expect("json");
        let second: Value = serde_json::from_str(&session.transport.outbound[1]).expect("json");
        assert_eq!(first["id"], 1);
        assert_eq!(second["id"], 2);
    }

    #[tokio::test]
    async fn test_call_surfaces_cdp_error() {
        let transport = ScriptedTransport::new([
            r#"{"id":1,"error":{"code":-32601,"message":"'Console.enable' wasn't found"}}"#,
        ]);
        let mut session = CdpSession::new(transport);

        let err = session
            .call("Console.enable", json!({}))
            .await
            .expect_err("must fail");
        assert!(matches!(err, Error::Cdp { code: -32601, .. }));
    }

    #[tokio::test]
    async fn test_call_skips_stale_reply() {
        let transport =
            ScriptedTransport::new([r#"{"id":99,"result":{}}"#, r#"{"id":1,"result":{"ok":true}}"#]);
        let mut session = CdpSession::new(transport);

        let result = session.call("Page.enable", json!({})).await.expect("call");
        assert_eq!(result["ok"], true);
    }

    #[tokio::test]
    async fn test_buffered_event_replayed_without_wire_read() {
        // The event arrives while the call is in flight. The later wait
        // must be satisfied from the buffer; the scripted transport is
        // empty by then and would error on any further read.
        let transport = ScriptedTransport::new([
            r#"{"method":"Page.loadEventFired","params":{"timestamp":2.0}}"#,
            r#"{"id":1,"result":{}}"#,
        ]);
        let mut session = CdpSession::new(transport);

        session
            .call("Page.setDocumentContent", json!({"frameId": "f1", "html": "<p/>"}))
            .await
            .expect("call");
        let params = session
            .await_event("Page.loadEventFired", None)
            .await
            .expect("event");
        assert_eq!(params["timestamp"], 2.0);
        assert!(session.buffered.is_empty());
    }

    #[tokio::test]
    async fn test_await_event_matches_expected_params() {
        let transport = ScriptedTransport::new([
            r#"{"method":"Page.frameStoppedLoading","params":{"frameId":"other"}}"#,
            r#"{"method":"Page.frameStoppedLoading","params":{"frameId":"f1"}}"#,
        ]);
        let mut session = CdpSession::new(transport);

        let params = session
            .await_event("Page.frameStoppedLoading", Some(&json!({"frameId": "f1"})))
            .await
            .expect("event");
        assert_eq!(params["frameId"], "f1");
        // The non-matching sibling stays buffered for later waiters.
        assert_eq!(session.buffered.len(), 1);
    }

    #[tokio::test]
    async fn test_await_event_ignores_extra_params() {
        // Matching is a subset check: extra keys on the event are fine.
        let transport = ScriptedTransport::new([
            r#"{"method":"Page.frameStoppedLoading","params":{"frameId":"f1","loaderId":"l1"}}"#,
        ]);
        let mut session = CdpSession::new(transport);

        let params = session
            .await_event("Page.frameStoppedLoading", Some(&json!({"frameId": "f1"})))
            .await
            .expect("event");
        assert_eq!(params["loaderId"], "l1");
    }

    #[tokio::test]
    async fn test_network_sentinel_resolves_without_wire_read_when_idle() {
        let transport = ScriptedTransport::new(Vec::<String>::new());
        let mut session = CdpSession::new(transport);

        let value = session
            .await_event(WAIT_FOR_NETWORK, None)
            .await
            .expect("idle");
        assert!(value.is_null());
    }

    #[tokio::test]
    async fn test_network_sentinel_waits_for_pending_requests() {
        let transport = ScriptedTransport::new([
            // Requests announced while the navigate call is in flight.
            r#"{"method":"Network.requestWillBeSent","params":{"requestId":"a","request":{"url":"http://x/a.css"}}}"#,
            r#"{"method":"Network.requestWillBeSent","params":{"requestId":"b","request":{"url":"http://x/b.png"}}}"#,
            r#"{"id":1,"result":{"frameId":"f1"}}"#,
            // Completions read by the sentinel wait.
            r#"{"method":"Network.loadingFinished","params":{"requestId":"a"}}"#,
            r#"{"method":"Network.loadingFailed","params":{"requestId":"b","errorText":"net::ERR_FAILED"}}"#,
        ]);
        let mut session = CdpSession::new(transport);

        session
            .call("Page.navigate", json!({"url": "http://x/"}))
            .await
            .expect("call");
        assert_eq!(session.network().pending(), 2);

        session
            .await_event(WAIT_FOR_NETWORK, None)
            .await
            .expect("idle");
        assert!(session.network().is_idle());
    }

    #[tokio::test]
    async fn test_awaited_network_event_still_updates_tracker() {
        let transport = ScriptedTransport::new([
            r#"{"method":"Network.requestWillBeSent","params":{"requestId":"a","request":{"url":"http://x/"}}}"#,
            r#"{"id":1,"result":{}}"#,
            r#"{"method":"Network.loadingFinished","params":{"requestId":"a"}}"#,
        ]);
        let mut session = CdpSession::new(transport);

        session.call("Network.enable", json!({})).await.expect("call");
        assert_eq!(session.network().pending(), 1);

        let params = session
            .await_event("Network.loadingFinished", None)
            .await
            .expect("event");
        assert_eq!(params["requestId"], "a");
        // The awaited event's bookkeeping must not be skipped.
        assert!(session.network().is_idle());
        assert!(session.buffered.is_empty());
    }

    #[tokio::test]
    async fn test_network_events_are_not_buffered() {
        let transport = ScriptedTransport::new([
            r#"{"method":"Network.requestWillBeSent","params":{"requestId":"a","request":{"url":"http://x/"}}}"#,
            r#"{"id":1,"result":{}}"#,
        ]);
        let mut session = CdpSession::new(transport);

        session.call("Network.enable", json!({})).await.expect("call");
        assert!(session.buffered.is_empty());
        assert_eq!(session.network().pending(), 1);
    }
}
