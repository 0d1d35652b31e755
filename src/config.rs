//! Renderer configuration.
//!
//! A renderer can drive an already running browser over its remote
//! debugging port, a locally launched binary, or both. When both are
//! set the remote endpoint is tried first and the binary serves as the
//! fallback.

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Conventional install location on Linux.
pub const DEFAULT_BINARY: &str = "/usr/bin/google-chrome";

/// Chrome's conventional remote debugging port.
pub const DEFAULT_REMOTE_PORT: u16 = 9222;

// ============================================================================
// RemoteEndpoint
// ============================================================================

/// Address of an already running browser's debugging API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEndpoint {
    /// Host name or address.
    pub host: String,
    /// Debugging port.
    pub port: u16,
}

impl RemoteEndpoint {
    /// Creates an endpoint on the default debugging port.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_REMOTE_PORT,
        }
    }

    /// Sets a non-default port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

// ============================================================================
// Endpoint
// ============================================================================

/// One way of reaching a browser, in fallback order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Attach to a running browser.
    Remote(RemoteEndpoint),
    /// Launch this binary.
    Local(PathBuf),
}

// ============================================================================
// ChromeConfig
// ============================================================================

/// Renderer configuration.
#[derive(Debug, Clone)]
pub struct ChromeConfig {
    /// Local binary to launch, if any.
    pub binary: Option<PathBuf>,
    /// Remote endpoint to attach to, if any. Preferred over the binary.
    pub remote: Option<RemoteEndpoint>,
}

impl Default for ChromeConfig {
    /// Local rendering with the conventional binary path, no remote.
    fn default() -> Self {
        Self {
            binary: Some(PathBuf::from(DEFAULT_BINARY)),
            remote: None,
        }
    }
}

impl ChromeConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the local binary path.
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = Some(binary.into());
        self
    }

    /// Removes the local binary, leaving remote-only operation.
    #[must_use]
    pub fn without_binary(mut self) -> Self {
        self.binary = None;
        self
    }

    /// Sets the remote endpoint.
    #[must_use]
    pub fn with_remote(mut self, remote: RemoteEndpoint) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Endpoints in the order they should be attempted: remote first,
    /// local binary second.
    #[must_use]
    pub fn endpoints(&self) -> Vec<Endpoint> {
        let mut endpoints = Vec::with_capacity(2);
        if let Some(remote) = &self.remote {
            endpoints.push(Endpoint::Remote(remote.clone()));
        }
        if let Some(binary) = &self.binary {
            endpoints.push(Endpoint::Local(binary.clone()));
        }
        endpoints
    }

    /// Ensures at least one endpoint is configured.
    pub fn ensure_usable(&self) -> Result<()> {
        if self.binary.is_none() && self.remote.is_none() {
            return Err(Error::config(
                "Neither a remote endpoint nor a local binary is configured",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
