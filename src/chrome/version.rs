//! Browser version detection and gating.
//!
//! `Page.printToPDF` landed in Chrome 59; anything older is rejected
//! up front instead of failing mid-render with an opaque CDP error.

// ============================================================================
// Imports
// ============================================================================

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

use super::remote;
use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Oldest major version with `Page.printToPDF` support.
pub const MIN_CHROME_VERSION: u32 = 59;

static VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(\d+)\.[\d.]+").unwrap()
});

// ============================================================================
// Detection
// ============================================================================

/// Pulls the major version out of a build string such as
/// `HeadlessChrome/120.0.6099.109` or `Google Chrome 120.0.6099.109`.
#[must_use]
pub fn parse_major(version: &str) -> Option<u32> {
    VERSION_PATTERN
        .captures(version)
        .and_then(|caps| caps[1].parse().ok())
}

/// Gates a detected major version against [`MIN_CHROME_VERSION`].
pub fn ensure_supported(version: u32) -> Result<u32> {
    if version < MIN_CHROME_VERSION {
        return Err(Error::VersionUnsupported {
            version,
            minimum: MIN_CHROME_VERSION,
        });
    }
    Ok(version)
}

/// Asks a local binary for its version via `--version`.
pub async fn local_version(binary: &Path) -> Result<u32> {
    if !binary.exists() {
        return Err(Error::binary_not_found(binary));
    }

    let output = Command::new(binary)
        .arg("--version")
        .output()
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::binary_not_found(binary),
            _ => Error::process_start(format!("Failed to run version check: {e}")),
        })?;
    if !output.status.success() {
        return Err(Error::process_start(format!(
            "Version check exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    debug!(version = %stdout.trim(), "Detected local browser version");
    parse_major(&stdout)
        .ok_or_else(|| Error::protocol(format!("Unparsable version output: {}", stdout.trim())))
}

/// Asks a remote debugger for its version via `/json/version`.
pub async fn remote_version(host: &str, port: u16) -> Result<u32> {
    let version = remote::json_version(host, port).await?;
    let browser = version
        .get("Browser")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::protocol(format!("Version probe without browser field: {version}")))?;
    debug!(version = browser, "Detected remote browser version");
    parse_major(browser)
        .ok_or_else(|| Error::protocol(format!("Unparsable browser version: {browser}")))
}

// ============================================================================
// Tests
// ============================================================================
