//! Per-message compression extension (permessage-deflate, RFC 7692).
//!
//! Negotiated during the handshake via `Sec-WebSocket-Extensions`. The
//! payload is raw-deflated with a sync flush and the 4-byte trailer the
//! flush appends is stripped before transmission; decompression restores
//! the boundary by appending the fixed `00 00 FF FF` trailer before
//! inflating. Compression contexts persist across messages (stateful
//! sliding window) unless "no context takeover" was negotiated.

// ============================================================================
// Imports
// ============================================================================

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Smallest permitted LZ77 window exponent.
const MIN_WINDOW_BITS: u8 = 9;

/// Largest permitted LZ77 window exponent.
const MAX_WINDOW_BITS: u8 = 15;

/// Sync-flush boundary consumed by the deflate side.
const SYNC_FLUSH_TRAILER: [u8; 4] = [0x00, 0x00, 0xFF, 0xFF];

// ============================================================================
// Role
// ============================================================================

/// Which end of the connection a compression context serves.
///
/// A client compresses with the client parameters and decompresses with
/// the server parameters; a server does the opposite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Client end.
    Client,
    /// Server end.
    Server,
}

// ============================================================================
// DeflateConfig
// ============================================================================

/// permessage-deflate negotiation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeflateConfig {
    /// Server must reset its compression context after each message.
    pub server_no_context_takeover: bool,
    /// Client must reset its compression context after each message.
    pub client_no_context_takeover: bool,
    /// Maximum window exponent for server-to-client compression.
    pub server_max_window_bits: u8,
    /// Maximum window exponent for client-to-server compression.
    pub client_max_window_bits: u8,
}

impl Default for DeflateConfig {
    fn default() -> Self {
        Self {
            server_no_context_takeover: false,
            client_no_context_takeover: false,
            server_max_window_bits: MAX_WINDOW_BITS,
            client_max_window_bits: MAX_WINDOW_BITS,
        }
    }
}

impl DeflateConfig {
    /// Creates a configuration with validated window sizes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a window exponent is outside 9-15.
    pub fn new(
        server_no_context_takeover: bool,
        client_no_context_takeover: bool,
        server_max_window_bits: u8,
        client_max_window_bits: u8,
    ) -> Result<Self> {
        for bits in [server_max_window_bits, client_max_window_bits] {
            if !(MIN_WINDOW_BITS..=MAX_WINDOW_BITS).contains(&bits) {
                return Err(Error::config(format!(
                    "max_window_bits must be in range {MIN_WINDOW_BITS}-{MAX_WINDOW_BITS}, got {bits}"
                )));
            }
        }

        Ok(Self {
            server_no_context_takeover,
            client_no_context_takeover,
            server_max_window_bits,
            client_max_window_bits,
        })
    }

    /// Renders the extension offer for the `Sec-WebSocket-Extensions`
    /// request header.
    ///
    /// Parameters at their defaults are omitted.
    #[must_use]
    pub fn offer(&self) -> String {
        let mut header = String::from("permessage-deflate");
        if self.server_no_context_takeover {
            header.push_str("; server_no_context_takeover");
        }
        if self.client_no_context_takeover {
            header.push_str("; client_no_context_takeover");
        }
        if self.server_max_window_bits != MAX_WINDOW_BITS {
            header.push_str(&format!(
                "; server_max_window_bits={}",
                self.server_max_window_bits
            ));
        }
        if self.client_max_window_bits != MAX_WINDOW_BITS {
            header.push_str(&format!(
                "; client_max_window_bits={}",
                self.client_max_window_bits
            ));
        }
        header
    }

    /// Merges the peer's `Sec-WebSocket-Extensions` response element into
    /// this offer, producing the effective configuration.
    ///
    /// Returns `None` if the element does not select permessage-deflate.
    /// Window sizes are capped at the offered values; unknown parameters
    /// are ignored.
    #[must_use]
    pub fn negotiate(&self, element: &str) -> Option<Self> {
        let mut negotiated = *self;
        let mut selected = false;

        for parameter in element.split(';') {
            let mut parts = parameter.splitn(2, '=');
            let key = parts.next().unwrap_or_default().trim();
            let value = parts.next().map(str::trim);

            match key {
                "permessage-deflate" => selected = true,
                "server_no_context_takeover" => negotiated.server_no_context_takeover = true,
                "client_no_context_takeover" => negotiated.client_no_context_takeover = true,
                "server_max_window_bits" => {
                    let bits = value
                        .and_then(|v| v.parse::<u8>().ok())
                        .unwrap_or(MAX_WINDOW_BITS);
                    negotiated.server_max_window_bits =
                        bits.clamp(MIN_WINDOW_BITS, self.server_max_window_bits);
                }
                "client_max_window_bits" => {
                    let bits = value
                        .and_then(|v| v.parse::<u8>().ok())
                        .unwrap_or(MAX_WINDOW_BITS);
                    negotiated.client_max_window_bits =
                        bits.clamp(MIN_WINDOW_BITS, self.client_max_window_bits);
                }
                _ => {}
            }
        }

        selected.then_some(negotiated)
    }
}

// ============================================================================
// DeflateContext
// ============================================================================

/// Stateful compressor/decompressor pair for one connection.
///
/// Contexts are created lazily on first use, and recreated per message
/// when the respective "no context takeover" flag is negotiated.
pub struct DeflateContext {
    config: DeflateConfig,
    role: Role,
    deflator: Option<Compress>,
    inflator: Option<Decompress>,
}

impl std::fmt::Debug for DeflateContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeflateContext")
            .field("config", &self.config)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

impl DeflateContext {
    /// Creates a context for the negotiated configuration.
    #[must_use]
    pub fn new(config: DeflateConfig, role: Role) -> Self {
        Self {
            config,
            role,
            deflator: None,
            inflator: None,
        }
    }

    /// Returns the negotiated configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &DeflateConfig {
        &self.config
    }

    /// Compresses one message payload.
    ///
    /// The caller sets `rsv1` on the first frame of the message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the deflate stream fails.
    pub fn compress(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        let (window_bits, no_context_takeover) = match self.role {
            Role::Client => (
                self.config.client_max_window_bits,
                self.config.client_no_context_takeover,
            ),
            Role::Server => (
                self.config.server_max_window_bits,
                self.config.server_no_context_takeover,
            ),
        };

        if no_context_takeover {
            self.deflator = None;
        }
        let deflator = self.deflator.get_or_insert_with(|| {
            Compress::new_with_window_bits(Compression::default(), false, window_bits)
        });

        let mut deflated = deflate_all(deflator, payload)?;
        // Drop the sync-flush trailer; the peer restores it on inflate.
        deflated.truncate(deflated.len().saturating_sub(SYNC_FLUSH_TRAILER.len()));
        Ok(deflated)
    }

    /// Decompresses one message payload (all frames concatenated).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the inflate stream fails.
    pub fn decompress(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        let (window_bits, no_context_takeover) = match self.role {
            Role::Client => (
                self.config.server_max_window_bits,
                self.config.server_no_context_takeover,
            ),
            Role::Server => (
                self.config.client_max_window_bits,
                self.config.client_no_context_takeover,
            ),
        };

        if no_context_takeover {
            self.inflator = None;
        }
        let inflator = self
            .inflator
            .get_or_insert_with(|| Decompress::new_with_window_bits(false, window_bits));

        let mut input = Vec::with_capacity(payload.len() + SYNC_FLUSH_TRAILER.len());
        input.extend_from_slice(payload);
        input.extend_from_slice(&SYNC_FLUSH_TRAILER);

        inflate_all(inflator, &input)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn deflate_all(deflator: &mut Compress, input: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len() / 2 + 16);
    let mut buf = [0u8; 4096];
    let mut consumed = 0usize;

    loop {
        let before_in = deflator.total_in();
        let before_out = deflator.total_out();

        deflator
            .compress(&input[consumed..], &mut buf, FlushCompress::Sync)
            .map_err(|e| Error::protocol(format!("Deflate failed: {e}")))?;

        consumed += (deflator.total_in() - before_in) as usize;
        let produced = (deflator.total_out() - before_out) as usize;
        out.extend_from_slice(&buf[..produced]);

        // Sync flush is complete once all input is consumed and the
        // output buffer was not filled to the brim.
        if consumed == input.len() && produced < buf.len() {
            return Ok(out);
        }
    }
}

fn inflate_all(inflator: &mut Decompress, input: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len() * 2 + 16);
    let mut buf = [0u8; 4096];
    let mut consumed = 0usize;

    loop {
        let before_in = inflator.total_in();
        let before_out = inflator.total_out();

        inflator
            .decompress(&input[consumed..], &mut buf, FlushDecompress::Sync)
            .map_err(|e| Error::protocol(format!("Inflate failed: {e}")))?;

        consumed += (inflator.total_in() - before_in) as usize;
        let produced = (inflator.total_out() - before_out) as usize;
        out.extend_from_slice(&buf[..produced]);

        if consumed == input.len() && produced < buf.len() {
            return Ok(out);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
