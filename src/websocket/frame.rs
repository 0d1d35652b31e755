//! WebSocket frame encoding and decoding (RFC 6455).
//!
//! A [`Frame`] is the wire unit: one opcode, optional masking, a payload
//! length encoded in 7, 16 or 64 bits. Frames are transient; the logical
//! unit visible to callers is the reassembled [`Message`].
//!
//! The [`FrameCodec`] is role-aware: a client masks every outgoing frame
//! with a fresh random key and accepts unmasked input, a server does the
//! opposite and fails the connection with close code 1002 when an
//! unmasked frame arrives.
//!
//! [`Message`]: super::Message

// ============================================================================
// Imports
// ============================================================================

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};

// ============================================================================
// Opcode
// ============================================================================

/// WebSocket frame opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Continuation of a fragmented message.
    Continuation = 0x0,
    /// UTF-8 text payload.
    Text = 0x1,
    /// Binary payload.
    Binary = 0x2,
    /// Connection close.
    Close = 0x8,
    /// Ping control frame.
    Ping = 0x9,
    /// Pong control frame.
    Pong = 0xA,
}

impl Opcode {
    /// Parses an opcode from its 4-bit wire value.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Self::Continuation),
            0x1 => Some(Self::Text),
            0x2 => Some(Self::Binary),
            0x8 => Some(Self::Close),
            0x9 => Some(Self::Ping),
            0xA => Some(Self::Pong),
            _ => None,
        }
    }

    /// Returns the 4-bit wire value.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns `true` for control opcodes (close, ping, pong).
    #[inline]
    #[must_use]
    pub const fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }
}

// ============================================================================
// Frame
// ============================================================================

/// A single WebSocket frame.
///
/// Produced and consumed one at a time; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame opcode.
    pub opcode: Opcode,
    /// Raw (unmasked) payload bytes.
    pub payload: Vec<u8>,
    /// Final fragment marker.
    pub fin: bool,
    /// RSV1 bit; set on the first frame of a compressed message.
    pub rsv1: bool,
}

impl Frame {
    /// Creates a final frame with the given opcode and payload.
    #[inline]
    #[must_use]
    pub fn new(opcode: Opcode, payload: Vec<u8>) -> Self {
        Self {
            opcode,
            payload,
            fin: true,
            rsv1: false,
        }
    }

    /// Creates a text frame.
    #[inline]
    #[must_use]
    pub fn text(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(Opcode::Text, payload.into())
    }

    /// Creates a binary frame.
    #[inline]
    #[must_use]
    pub fn binary(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(Opcode::Binary, payload.into())
    }

    /// Creates a continuation frame.
    #[inline]
    #[must_use]
    pub fn continuation(payload: Vec<u8>, fin: bool) -> Self {
        Self {
            opcode: Opcode::Continuation,
            payload,
            fin,
            rsv1: false,
        }
    }

    /// Creates a close frame with status code and reason.
    #[must_use]
    pub fn close(code: u16, reason: &str) -> Self {
        let mut payload = Vec::with_capacity(2 + reason.len());
        payload.extend_from_slice(&code.to_be_bytes());
        payload.extend_from_slice(reason.as_bytes());
        Self::new(Opcode::Close, payload)
    }

    /// Creates a pong frame echoing the given ping payload.
    #[inline]
    #[must_use]
    pub fn pong(payload: Vec<u8>) -> Self {
        Self::new(Opcode::Pong, payload)
    }

    /// Parses the close status code from a close frame payload, if any.
    #[must_use]
    pub fn close_code(&self) -> Option<u16> {
        if self.opcode == Opcode::Close && self.payload.len() >= 2 {
            Some(u16::from_be_bytes([self.payload[0], self.payload[1]]))
        } else {
            None
        }
    }
}

// ============================================================================
// FrameCodec
// ============================================================================

/// Role-aware frame encoder/decoder.
///
/// Reads are length-driven: the codec reads exactly the number of bytes
/// the header declares, looping on partial reads, and fails with a
/// connection error if the stream runs dry before completion.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    /// Mask outgoing frames (client role).
    mask_outgoing: bool,
    /// Require incoming frames to be masked (server role).
    require_masked_input: bool,
}

impl FrameCodec {
    /// Codec for the client role: outgoing masked, incoming unmasked.
    #[inline]
    #[must_use]
    pub const fn client() -> Self {
        Self {
            mask_outgoing: true,
            require_masked_input: false,
        }
    }

    /// Codec for the server role: outgoing unmasked, incoming masked.
    #[inline]
    #[must_use]
    pub const fn server() -> Self {
        Self {
            mask_outgoing: false,
            require_masked_input: true,
        }
    }

    /// Encodes a frame to its wire representation.
    ///
    /// In client role a fresh random 4-byte mask key is generated per
    /// frame and the payload is XOR-masked.
    #[must_use]
    pub fn encode(&self, frame: &Frame) -> Bytes {
        let payload_len = frame.payload.len();
        let mut buf = BytesMut::with_capacity(payload_len + 14);

        let mut byte1 = frame.opcode.as_u8();
        if frame.fin {
            byte1 |= 0b1000_0000;
        }
        if frame.rsv1 {
            byte1 |= 0b0100_0000;
        }
        buf.put_u8(byte1);

        let mask_bit: u8 = if self.mask_outgoing { 0b1000_0000 } else { 0 };
        if payload_len > 65535 {
            buf.put_u8(mask_bit | 127);
            buf.put_u64(payload_len as u64);
        } else if payload_len > 125 {
            buf.put_u8(mask_bit | 126);
            buf.put_u16(payload_len as u16);
        } else {
            buf.put_u8(mask_bit | payload_len as u8);
        }

        if self.mask_outgoing {
            let key: [u8; 4] = rand::random();
            buf.put_slice(&key);
            for (i, byte) in frame.payload.iter().enumerate() {
                buf.put_u8(byte ^ key[i % 4]);
            }
        } else {
            buf.put_slice(&frame.payload);
        }

        buf.freeze()
    }

    /// Reads exactly one frame from the stream.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] if the stream yields no bytes before the
    ///   declared length is complete (connection dead)
    /// - [`Error::FrameViolation`] with close code 1002 if masking is
    ///   required but the frame arrived unmasked
    /// - [`Error::Protocol`] on an unknown opcode
    pub async fn read_frame<R>(&self, stream: &mut R) -> Result<Frame>
    where
        R: AsyncRead + Unpin,
    {
        let mut header = [0u8; 2];
        read_exact_or_dead(stream, &mut header).await?;

        let fin = header[0] & 0b1000_0000 != 0;
        let rsv1 = header[0] & 0b0100_0000 != 0;
        let opcode_bits = header[0] & 0b0000_1111;
        let opcode = Opcode::from_u8(opcode_bits)
            .ok_or_else(|| Error::protocol(format!("Unknown opcode: {opcode_bits:#x}")))?;

        let masked = header[1] & 0b1000_0000 != 0;
        let mut payload_len = u64::from(header[1] & 0b0111_1111);

        if payload_len == 126 {
            let mut ext = [0u8; 2];
            read_exact_or_dead(stream, &mut ext).await?;
            payload_len = u64::from(u16::from_be_bytes(ext));
        } else if payload_len == 127 {
            let mut ext = [0u8; 8];
            read_exact_or_dead(stream, &mut ext).await?;
            payload_len = u64::from_be_bytes(ext);
        }

        let mut mask_key = [0u8; 4];
        if masked {
            read_exact_or_dead(stream, &mut mask_key).await?;
        }

        let mut payload = vec![0u8; payload_len as usize];
        if payload_len > 0 {
            read_exact_or_dead(stream, &mut payload).await?;
            if masked {
                for (i, byte) in payload.iter_mut().enumerate() {
                    *byte ^= mask_key[i % 4];
                }
            }
        }

        if self.require_masked_input && !masked {
            return Err(Error::frame_violation(1002, "Masking required"));
        }

        Ok(Frame {
            opcode,
            payload,
            fin,
            rsv1,
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Reads exactly `buf.len()` bytes, translating a dried-up stream into a
/// connection error.
async fn read_exact_or_dead<R>(stream: &mut R, buf: &mut [u8]) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    stream.read_exact(buf).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::connection("Empty read, connection dead")
        } else {
            Error::Io(e)
        }
    })?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
