//! Error types for headless Chrome PDF rendering.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use chrome_pdf::{Result, Renderer};
//!
//! async fn example(renderer: &Renderer, job: &chrome_pdf::RenderJob) -> Result<()> {
//!     let pdf = renderer.render(job).await?;
//!     assert!(pdf.starts_with(b"%PDF-"));
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::VersionUnsupported`] |
//! | Process | [`Error::BinaryNotFound`], [`Error::ProcessStart`], [`Error::StartupTimeout`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`], [`Error::Handshake`] |
//! | Protocol | [`Error::Protocol`], [`Error::Cdp`], [`Error::FrameViolation`] |
//! | Execution | [`Error::Timeout`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::Storage`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::path::PathBuf;
use std::result::Result as StdResult;

use thiserror::Error;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when the resolved configuration is unusable, e.g. neither
    /// a remote endpoint nor a local binary is set.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Detected browser version is below the supported minimum.
    ///
    /// Surfaced by configuration validation, never mid-render.
    #[error("Unsupported Chrome version {version}, minimum is {minimum}")]
    VersionUnsupported {
        /// Detected major version.
        version: u32,
        /// Minimum supported major version.
        minimum: u32,
    },

    // ========================================================================
    // Process Errors
    // ========================================================================
    /// Chrome binary not found at path.
    #[error("Chrome not found at: {path}")]
    BinaryNotFound {
        /// Path where Chrome was expected.
        path: PathBuf,
    },

    /// Failed to launch the browser process, or it exited before
    /// announcing its debug endpoint.
    #[error("Failed to start browser: {message}")]
    ProcessStart {
        /// Description of the launch failure.
        message: String,
    },

    /// The browser produced no debug endpoint within the startup window.
    ///
    /// The process has been terminated when this is returned.
    #[error("Browser produced no debug endpoint within {timeout_ms}ms")]
    StartupTimeout {
        /// Milliseconds waited before the watchdog fired.
        timeout_ms: u64,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Endpoint unreachable or socket-level failure.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection closed; no further operations are possible.
    #[error("Connection closed")]
    ConnectionClosed,

    /// WebSocket upgrade handshake failed.
    ///
    /// Carries the HTTP status of the response for diagnostics.
    #[error("Handshake failed (status {status}): {message}")]
    Handshake {
        /// HTTP status code of the upgrade response.
        status: u16,
        /// Description of the handshake failure.
        message: String,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// A received frame violated the WebSocket protocol.
    ///
    /// Carries the close code that should be sent to the peer
    /// (e.g. 1002 for an unmasked frame where masking is required).
    #[error("Frame violation (close {close_code}): {message}")]
    FrameViolation {
        /// WebSocket close status code.
        close_code: u16,
        /// Description of the violation.
        message: String,
    },

    /// Malformed or unexpected protocol message.
    ///
    /// Always fatal to the current job; never retried.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// The browser answered a CDP call with an error object.
    #[error("Error response ({code}): {message}")]
    Cdp {
        /// CDP error code.
        code: i64,
        /// CDP error message.
        message: String,
    },

    // ========================================================================
    // Execution Errors
    // ========================================================================
    /// Operation timeout.
    ///
    /// Returned when a socket read or a bounded wait exceeds its limit.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// Storage capability failure.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a binary not found error.
    #[inline]
    pub fn binary_not_found(path: impl Into<PathBuf>) -> Self {
        Self::BinaryNotFound { path: path.into() }
    }

    /// Creates a process start error.
    #[inline]
    pub fn process_start(message: impl Into<String>) -> Self {
        Self::ProcessStart {
            message: message.into(),
        }
    }

    /// Creates a startup timeout error.
    #[inline]
    pub fn startup_timeout(timeout_ms: u64) -> Self {
        Self::StartupTimeout { timeout_ms }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a handshake error.
    #[inline]
    pub fn handshake(status: u16, message: impl Into<String>) -> Self {
        Self::Handshake {
            status,
            message: message.into(),
        }
    }

    /// Creates a frame violation error.
    #[inline]
    pub fn frame_violation(close_code: u16, message: impl Into<String>) -> Self {
        Self::FrameViolation {
            close_code,
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a CDP error-response error.
    #[inline]
    pub fn cdp(code: i64, message: impl Into<String>) -> Self {
        Self::Cdp {
            code,
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Creates a storage error.
    #[inline]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::StartupTimeout { .. } | Self::Timeout { .. })
    }

    /// Returns `true` if this is a connection-level error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionClosed
                | Self::Handshake { .. }
                | Self::Io(_)
        )
    }

    /// Returns `true` if this is a protocol-level error.
    #[inline]
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::Protocol { .. } | Self::Cdp { .. } | Self::FrameViolation { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
