//! Browser lifecycle: launching, discovery, version gating.

// ============================================================================
// Modules
// ============================================================================

/// Local process supervision.
pub mod process;

/// Remote debugger discovery (`/json/version`).
pub mod remote;

/// Version detection and minimum-version gating.
pub mod version;

// ============================================================================
// Re-exports
// ============================================================================

pub use process::{ChromeProcess, DebugEndpoint, STARTUP_TIMEOUT};
pub use remote::{browser_id_from_debugger_url, json_version};
pub use version::{MIN_CHROME_VERSION, ensure_supported, local_version, parse_major, remote_version};
