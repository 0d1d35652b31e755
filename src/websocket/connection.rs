//! WebSocket connection: connect, send, receive, close.
//!
//! Composes the frame codec, the optional compression contexts and the
//! handshake into a duplex message channel. Large messages are split into
//! fixed-size frames on send; on receive, frames are buffered until the
//! final one, concatenated, and only then decompressed when RSV1 was set
//! on the first frame.
//!
//! All reads and writes on one connection are strictly sequential; the
//! connection is owned by exactly one session and never shared.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{Error, Result};

use super::compression::{DeflateConfig, DeflateContext, Role};
use super::frame::{Frame, FrameCodec, Opcode};
use super::handshake::{self, HandshakeOutcome};
use super::message::Message;

// ============================================================================
// Constants
// ============================================================================

/// Default socket timeout for connect and per-frame reads.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default maximum frame payload size for outgoing messages.
const DEFAULT_FRAME_SIZE: usize = 4096;

/// Upper bound on handshake redirects followed per connect.
const MAX_REDIRECTS: usize = 3;

// ============================================================================
// ConnectOptions
// ============================================================================

/// Tunables for one connection.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Socket timeout applied to connect and each frame read.
    pub timeout: Duration,
    /// Maximum payload bytes per outgoing frame.
    pub frame_size: usize,
    /// Compression offer; `None` disables the extension.
    pub compression: Option<DeflateConfig>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            frame_size: DEFAULT_FRAME_SIZE,
            compression: None,
        }
    }
}

impl ConnectOptions {
    /// Sets the socket timeout.
    #[inline]
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the maximum outgoing frame payload size.
    #[inline]
    #[must_use]
    pub fn frame_size(mut self, frame_size: usize) -> Self {
        self.frame_size = frame_size.max(1);
        self
    }

    /// Offers permessage-deflate with the given parameters.
    #[inline]
    #[must_use]
    pub fn compression(mut self, config: DeflateConfig) -> Self {
        self.compression = Some(config);
        self
    }
}

// ============================================================================
// WsConnection
// ============================================================================

/// One client-role WebSocket connection.
///
/// Read-only once closed: after [`close`](Self::close) or a received
/// close, every operation except drop fails with
/// [`Error::ConnectionClosed`].
pub struct WsConnection {
    stream: TcpStream,
    codec: FrameCodec,
    compression: Option<DeflateContext>,
    frame_size: usize,
    read_timeout: Duration,
    closed: bool,
}

impl std::fmt::Debug for WsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsConnection")
            .field("closed", &self.closed)
            .field("compressed", &self.compression.is_some())
            .finish_non_exhaustive()
    }
}

impl WsConnection {
    /// Connects with default options.
    ///
    /// See [`connect_with`](Self::connect_with).
    pub async fn connect(uri: &Url) -> Result<Self> {
        Self::connect_with(uri, ConnectOptions::default()).await
    }

    /// Opens a TCP connection, performs the upgrade handshake and
    /// follows redirects up to a bounded count.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] for a non-`ws` scheme or a URI without host
    /// - [`Error::Connection`] if the endpoint is unreachable or too
    ///   many redirects occur
    /// - [`Error::Handshake`] if the upgrade is rejected
    /// - [`Error::Timeout`] if connect or handshake exceed the timeout
    pub async fn connect_with(uri: &Url, options: ConnectOptions) -> Result<Self> {
        let mut target = uri.clone();

        for _ in 0..=MAX_REDIRECTS {
            let mut stream = Self::open_socket(&target, options.timeout).await?;

            let outcome = timeout(
                options.timeout,
                handshake::perform(&mut stream, &target, options.compression.as_ref()),
            )
            .await
            .map_err(|_| Error::timeout("websocket handshake", options.timeout.as_millis() as u64))??;

            match outcome {
                HandshakeOutcome::Accepted { compression } => {
                    debug!(uri = %target, compressed = compression.is_some(), "WebSocket connected");
                    return Ok(Self {
                        stream,
                        codec: FrameCodec::client(),
                        compression: compression
                            .map(|config| DeflateContext::new(config, Role::Client)),
                        frame_size: options.frame_size,
                        read_timeout: options.timeout,
                        closed: false,
                    });
                }
                HandshakeOutcome::Redirect(next) => {
                    debug!(from = %target, to = %next, "Handshake redirected");
                    target = next;
                }
            }
        }

        Err(Error::connection(format!(
            "Too many handshake redirects (>{MAX_REDIRECTS}) for {uri}"
        )))
    }

    /// Sends one message, fragmenting data payloads as needed.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] after close
    /// - [`Error::Io`] on socket failure
    pub async fn send(&mut self, message: Message) -> Result<()> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }

        let opcode = message.opcode();
        if opcode.is_control() {
            let frame = Frame::new(opcode, message.into_payload());
            return self.write_frame(&frame).await;
        }

        let mut payload = message.into_payload();
        let mut rsv1 = false;
        if let Some(compression) = self.compression.as_mut() {
            payload = compression.compress(&payload)?;
            rsv1 = true;
        }

        for frame in build_frames(opcode, payload, rsv1, self.frame_size) {
            self.write_frame(&frame).await?;
        }
        Ok(())
    }

    /// Receives the next message, reassembling fragments and answering
    /// pings transparently.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] after close
    /// - [`Error::Timeout`] if a frame read exceeds the socket timeout
    /// - [`Error::Protocol`] on invalid fragmentation or encoding
    pub async fn receive(&mut self) -> Result<Message> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }

        let mut opcode: Option<Opcode> = None;
        let mut compressed = false;
        let mut payload: Vec<u8> = Vec::new();

        loop {
            let frame = self.read_frame().await?;
            trace!(opcode = ?frame.opcode, fin = frame.fin, len = frame.payload.len(), "Frame received");

            match frame.opcode {
                Opcode::Ping => {
                    self.write_frame(&Frame::pong(frame.payload)).await?;
                    continue;
                }
                Opcode::Pong => continue,
                Opcode::Close => {
                    let code = frame.close_code();
                    let reason = String::from_utf8_lossy(
                        frame.payload.get(2..).unwrap_or_default(),
                    )
                    .into_owned();
                    // Echo the close before going silent.
                    let echo = Frame::new(Opcode::Close, frame.payload.clone());
                    if let Err(e) = self.write_frame(&echo).await {
                        debug!(error = %e, "Failed to echo close frame");
                    }
                    self.closed = true;
                    return Ok(Message::Close { code, reason });
                }
                Opcode::Text | Opcode::Binary => {
                    if opcode.is_some() {
                        return Err(Error::protocol("Data frame while message in progress"));
                    }
                    opcode = Some(frame.opcode);
                    compressed = frame.rsv1;
                    payload = frame.payload;
                }
                Opcode::Continuation => {
                    if opcode.is_none() {
                        return Err(Error::protocol("Continuation frame without initial frame"));
                    }
                    payload.extend_from_slice(&frame.payload);
                }
            }

            if frame.fin {
                break;
            }
        }

        if compressed {
            let compression = self
                .compression
                .as_mut()
                .ok_or_else(|| Error::protocol("Compressed frame on uncompressed connection"))?;
            payload = compression.decompress(&payload)?;
        }

        match opcode {
            Some(Opcode::Text) => {
                let text = String::from_utf8(payload)
                    .map_err(|_| Error::protocol("Text message is not valid UTF-8"))?;
                Ok(Message::Text(text))
            }
            Some(Opcode::Binary) => Ok(Message::Binary(payload)),
            _ => Err(Error::protocol("Message without data opcode")),
        }
    }

    /// Initiates a close: sends the close frame and waits for the echo.
    ///
    /// The connection is unusable afterwards regardless of the outcome.
    ///
    /// # Errors
    ///
    /// Returns the socket or timeout error if the peer never
    /// acknowledges; callers may treat that as non-fatal.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        let result = self.close_inner().await;
        self.closed = true;
        result
    }

    async fn close_inner(&mut self) -> Result<()> {
        self.write_frame(&Frame::close(1000, "")).await?;

        // Drain until the peer echoes the close.
        loop {
            let frame = self.read_frame().await?;
            if frame.opcode == Opcode::Close {
                debug!("Close acknowledged by peer");
                return Ok(());
            }
            trace!(opcode = ?frame.opcode, "Discarding frame while closing");
        }
    }

    async fn open_socket(uri: &Url, connect_timeout: Duration) -> Result<TcpStream> {
        if uri.scheme() != "ws" {
            return Err(Error::config(format!(
                "Invalid URI scheme '{}', only 'ws' is supported",
                uri.scheme()
            )));
        }
        let host = uri
            .host_str()
            .ok_or_else(|| Error::config(format!("URI has no host: {uri}")))?;
        let port = uri.port().unwrap_or(80);

        let stream = timeout(connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| Error::timeout("tcp connect", connect_timeout.as_millis() as u64))?
            .map_err(|e| Error::connection(format!("Could not open socket to {host}:{port}: {e}")))?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    async fn read_frame(&mut self) -> Result<Frame> {
        timeout(self.read_timeout, self.codec.read_frame(&mut self.stream))
            .await
            .map_err(|_| Error::timeout("socket read", self.read_timeout.as_millis() as u64))?
    }

    async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let encoded = self.codec.encode(frame);
        self.stream.write_all(&encoded).await?;
        Ok(())
    }
}

impl Drop for WsConnection {
    fn drop(&mut self) {
        if !self.closed {
            warn!("WebSocket connection dropped without close");
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Splits a message payload into frames of at most `frame_size` bytes.
///
/// The first frame carries the real opcode (and RSV1 for compressed
/// messages), the rest are continuations; only the last is final.
fn build_frames(opcode: Opcode, payload: Vec<u8>, rsv1: bool, frame_size: usize) -> Vec<Frame> {
    if payload.len() <= frame_size {
        let mut frame = Frame::new(opcode, payload);
        frame.rsv1 = rsv1;
        return vec![frame];
    }

    let mut chunks = payload.chunks(frame_size).peekable();
    let mut frames = Vec::with_capacity(payload.len() / frame_size + 1);
    let mut first = true;

    while let Some(chunk) = chunks.next() {
        let fin = chunks.peek().is_none();
        let frame = if first {
            first = false;
            Frame {
                opcode,
                payload: chunk.to_vec(),
                fin,
                rsv1,
            }
        } else {
            Frame::continuation(chunk.to_vec(), fin)
        };
        frames.push(frame);
    }

    frames
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_frames_single() {
        let frames = build_frames(Opcode::Text, b"short".to_vec(), false, 4096);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].opcode, Opcode::Text);
        assert!(frames[0].fin);
        assert!(!frames[0].rsv1);
    }

    #[test]
    fn test_build_frames_fragmented() {
        let payload: Vec<u8> = (0..10u8).collect();
        let frames = build_frames(Opcode::Binary, payload.clone(), true, 4);

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].opcode, Opcode::Binary);
        assert!(frames[0].rsv1, "rsv1 only on the first frame");
        assert!(!frames[0].fin);
        assert_eq!(frames[1].opcode, Opcode::Continuation);
        assert!(!frames[1].rsv1);
        assert!(!frames[1].fin);
        assert_eq!(frames[2].opcode, Opcode::Continuation);
        assert!(frames[2].fin);

        let reassembled: Vec<u8> = frames.iter().flat_map(|f| f.payload.clone()).collect();
        assert_eq!(reassembled, payload);
    }

    #[test]
    fn test_build_frames_exact_boundary() {
        let frames = build_frames(Opcode::Binary, vec![0; 8], false, 4);
        assert_eq!(frames.len(), 2);
        assert!(frames[1].fin);
        assert_eq!(frames[1].payload.len(), 4);
    }

    #[test]
    fn test_build_frames_empty_payload() {
        let frames = build_frames(Opcode::Text, Vec::new(), false, 4096);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].fin);
        assert!(frames[0].payload.is_empty());
    }
}
