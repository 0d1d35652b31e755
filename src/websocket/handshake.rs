//! WebSocket upgrade handshake (client role).
//!
//! Issues the HTTP/1.1 `GET` with `Upgrade: websocket` headers, then
//! validates the `101` response: `Sec-WebSocket-Accept` must equal
//! `base64(SHA1(key + GUID))`. A `3xx` response with a `Location` header
//! is reported as a redirect for the caller to follow; anything else is
//! a handshake failure carrying the response status for diagnostics.

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Cow;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

use super::compression::DeflateConfig;

// ============================================================================
// Constants
// ============================================================================

/// Fixed GUID appended to the key for the accept digest (RFC 6455 §4.2.2).
const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Upper bound on the upgrade response head, to keep a misbehaving peer
/// from growing the buffer unboundedly.
const MAX_RESPONSE_HEAD: usize = 16 * 1024;

// ============================================================================
// HandshakeOutcome
// ============================================================================

/// Result of one upgrade attempt.
#[derive(Debug)]
pub enum HandshakeOutcome {
    /// Upgrade accepted; carries the negotiated compression parameters,
    /// if the server selected permessage-deflate.
    Accepted {
        /// Effective compression configuration, if negotiated.
        compression: Option<DeflateConfig>,
    },
    /// Server redirected; the caller should reconnect to the new URI.
    Redirect(Url),
}

// ============================================================================
// HttpResponse
// ============================================================================

/// Minimal parsed HTTP response head.
#[derive(Debug)]
struct HttpResponse {
    status: u16,
    reason: String,
    headers: Vec<(String, String)>,
}

impl HttpResponse {
    /// Case-insensitive header lookup.
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

// ============================================================================
// Handshake
// ============================================================================

/// Performs the upgrade exchange on a freshly connected stream.
///
/// # Errors
///
/// - [`Error::Handshake`] on a non-101, non-redirect status or a bad
///   `Sec-WebSocket-Accept` value
/// - [`Error::Connection`] if the stream dies mid-response
pub async fn perform<S>(
    stream: &mut S,
    uri: &Url,
    compression: Option<&DeflateConfig>,
) -> Result<HandshakeOutcome>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let key = generate_key();
    let request = render_request(uri, &key, compression);
    stream.write_all(request.as_bytes()).await?;
    stream.flush().await?;

    let response = read_response(stream).await?;
    debug!(status = response.status, "Handshake response received");

    if (300..400).contains(&response.status) {
        let location = response.header("Location").ok_or_else(|| {
            Error::handshake(response.status, "Redirect without Location header")
        })?;
        let target = uri
            .join(location)
            .map_err(|e| Error::handshake(response.status, format!("Bad redirect: {e}")))?;
        return Ok(HandshakeOutcome::Redirect(target));
    }

    if response.status != 101 {
        return Err(Error::handshake(
            response.status,
            format!("Invalid status code ({})", response.reason),
        ));
    }

    let accept = response
        .header("Sec-WebSocket-Accept")
        .map(str::trim)
        .unwrap_or_default();
    if accept.is_empty() {
        return Err(Error::handshake(
            response.status,
            "Server sent invalid upgrade response",
        ));
    }
    if accept != accept_key(&key) {
        return Err(Error::handshake(
            response.status,
            "Server sent bad upgrade response",
        ));
    }

    let negotiated = match (compression, response.header("Sec-WebSocket-Extensions")) {
        (Some(offered), Some(extensions)) => extensions
            .split(',')
            .find_map(|element| offered.negotiate(element.trim())),
        _ => None,
    };

    Ok(HandshakeOutcome::Accepted {
        compression: negotiated,
    })
}

/// Generates a fresh `Sec-WebSocket-Key`: 16 random bytes, base64.
#[must_use]
pub fn generate_key() -> String {
    let nonce: [u8; 16] = rand::random();
    BASE64.encode(nonce)
}

/// Computes the expected `Sec-WebSocket-Accept` for a key.
#[must_use]
pub fn accept_key(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.as_bytes());
    sha1.update(WEBSOCKET_GUID.as_bytes());
    BASE64.encode(sha1.finalize())
}

// ============================================================================
// Helpers
// ============================================================================

/// Renders the upgrade request head.
fn render_request(uri: &Url, key: &str, compression: Option<&DeflateConfig>) -> String {
    let mut target = uri.path().to_string();
    if let Some(query) = uri.query() {
        target.push('?');
        target.push_str(query);
    }

    let host = uri.host_str().unwrap_or_default();
    let host_header = match uri.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    let mut request = format!(
        "GET {target} HTTP/1.1\r\n\
         Host: {host_header}\r\n\
         User-Agent: chrome-pdf\r\n\
         Connection: Upgrade\r\n\
         Upgrade: websocket\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: 13\r\n"
    );

    if let Some(config) = compression {
        request.push_str(&format!("Sec-WebSocket-Extensions: {}\r\n", config.offer()));
    }

    // Basic auth from URI userinfo. The URI carries it
    // percent-encoded; credentials go over the wire decoded.
    if !uri.username().is_empty() {
        let userinfo = format!(
            "{}:{}",
            percent_decoded(uri.username()),
            percent_decoded(uri.password().unwrap_or_default())
        );
        request.push_str(&format!("Authorization: Basic {}\r\n", BASE64.encode(userinfo)));
    }

    request.push_str("\r\n");
    request
}

fn percent_decoded(value: &str) -> String {
    urlencoding::decode(value).map_or_else(|_| value.to_string(), Cow::into_owned)
}

/// Reads the response head up to the blank line.
async fn read_response<S>(stream: &mut S) -> Result<HttpResponse>
where
    S: AsyncRead + Unpin,
{
    let mut head = Vec::with_capacity(512);
    let mut byte = [0u8; 1];

    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_RESPONSE_HEAD {
            return Err(Error::protocol("Handshake response head too large"));
        }
        let read = stream.read(&mut byte).await?;
        if read == 0 {
            return Err(Error::connection("Connection closed during handshake"));
        }
        head.push(byte[0]);
    }

    parse_response(&head)
}

/// Parses a raw response head into status, reason and headers.
fn parse_response(head: &[u8]) -> Result<HttpResponse> {
    let text = std::str::from_utf8(head)
        .map_err(|_| Error::protocol("Handshake response is not valid UTF-8"))?;
    let mut lines = text.split("\r\n");

    let status_line = lines
        .next()
        .ok_or_else(|| Error::protocol("Empty handshake response"))?;
    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/1.") {
        return Err(Error::protocol(format!(
            "Unexpected handshake response: {status_line}"
        )));
    }
    let status = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| Error::protocol(format!("Bad status line: {status_line}")))?;
    let reason = parts.next().unwrap_or_default().to_string();

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    Ok(HttpResponse {
        status,
        reason,
        headers,
    })
}

// ============================================================================
// Tests
// ============================================================================
