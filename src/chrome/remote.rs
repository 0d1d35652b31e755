//! Remote debugger discovery over HTTP.
//!
//! A browser started with `--remote-debugging-port` serves a small JSON
//! API next to its WebSocket endpoints. `GET /json/version` yields the
//! browser build string and the `webSocketDebuggerUrl` of the browser
//! target, which is all the renderer needs to attach to an already
//! running instance.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Bound on the whole probe, connect included.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Probing
// ============================================================================

/// Fetches `/json/version` from a remote debugger.
///
/// # Errors
///
/// [`Error::Connection`] when the endpoint is unreachable, answers with
/// a non-200 status or the probe times out; [`Error::Json`] when the
/// body is not valid JSON.
pub async fn json_version(host: &str, port: u16) -> Result<Value> {
    debug!(host, port, "Probing remote debugger");
    match timeout(PROBE_TIMEOUT, probe(host, port)).await {
        Ok(result) => result,
        Err(_) => Err(Error::timeout(
            format!("/json/version probe of {host}:{port}"),
            PROBE_TIMEOUT.as_millis() as u64,
        )),
    }
}

/// Extracts the browser id from a `webSocketDebuggerUrl`, its last
/// path segment.
pub fn browser_id_from_debugger_url(url: &str) -> Result<&str> {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Error::protocol(format!("Debugger URL without browser id: {url}")))
}

async fn probe(host: &str, port: u16) -> Result<Value> {
    let mut stream = TcpStream::connect((host, port))
        .await
        .map_err(|e| Error::connection(format!("Failed to connect to {host}:{port}: {e}")))?;

    let request = format!(
        "GET /json/version HTTP/1.1\r\n\
         Host: {host}:{port}\r\n\
         Accept: application/json\r\n\
         Connection: close\r\n\
         \r\n"
    );
    stream.write_all(request.as_bytes()).await?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await?;

    let header_end = find_blank_line(&response).ok_or_else(|| {
        Error::connection(format!("Malformed HTTP response from {host}:{port}"))
    })?;
    let head = String::from_utf8_lossy(&response[..header_end]);
    let status = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| Error::connection(format!("Malformed status line from {host}:{port}")))?;
    if status != 200 {
        return Err(Error::connection(format!(
            "Remote debugger at {host}:{port} answered /json/version with status {status}"
        )));
    }

    let body = &response[header_end + 4..];
    Ok(serde_json::from_slice(body)?)
}

fn find_blank_line(response: &[u8]) -> Option<usize> {
    response.windows(4).position(|window| window == b"\r\n\r\n")
}

// ============================================================================
// Tests
// ============================================================================
