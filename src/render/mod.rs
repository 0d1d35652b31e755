//! PDF rendering: job description and orchestration.

// ============================================================================
// Modules
// ============================================================================

/// What to print and how.
pub mod job;

/// End-to-end render flow.
pub mod orchestrator;

// ============================================================================
// Re-exports
// ============================================================================

pub use job::{ContentSource, PrintParameters, RenderJob};
pub use orchestrator::Renderer;
