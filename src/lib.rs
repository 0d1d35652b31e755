//! Headless Chrome PDF rendering over a self-contained DevTools stack.
//!
//! Renders URLs or inline HTML to PDF by driving a headless Chromium
//! through the Chrome DevTools Protocol. Everything between this crate
//! and the browser socket is implemented here: the WebSocket transport
//! (RFC 6455, optional permessage-deflate), the CDP session layer and
//! the process supervision around a locally launched binary.
//!
//! # Architecture
//!
//! A render walks down through four layers:
//!
//! - [`Renderer`] picks an endpoint (remote debugger first, launched
//!   binary as fallback) and orchestrates the whole flow
//! - [`chrome`] launches and supervises the browser, or probes a
//!   running one via `/json/version`
//! - [`cdp`] speaks the protocol: one command in flight at a time,
//!   events buffered for later waiters, network requests tracked for
//!   the idle wait
//! - [`websocket`] carries it all: handshake, framing, fragmentation,
//!   compression
//!
//! # Quick Start
//!
//! ```no_run
//! use chrome_pdf::{ChromeConfig, RenderJob, Renderer, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let renderer = Renderer::new(ChromeConfig::default())?;
//!
//!     let job = RenderJob::from_html("<h1>Invoice #42</h1>");
//!     let pdf = renderer.render(&job).await?;
//!     assert!(pdf.starts_with(b"%PDF-"));
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`render`] | Render jobs, print parameters, orchestration |
//! | [`cdp`] | DevTools protocol session, events, network tracking |
//! | [`chrome`] | Process supervision, remote discovery, version gate |
//! | [`websocket`] | WebSocket client transport |
//! | [`config`] | Endpoint configuration |
//! | [`storage`] | Scratch space for browser state and finished PDFs |
//! | [`error`] | Error types |

// ============================================================================
// Modules
// ============================================================================

/// Chrome DevTools Protocol session layer.
pub mod cdp;

/// Browser lifecycle: launch, discovery, version gating.
pub mod chrome;

/// Renderer configuration.
pub mod config;

/// Error types.
pub mod error;

/// Render jobs and orchestration.
pub mod render;

/// Local file storage for render byproducts.
pub mod storage;

/// WebSocket client transport.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use cdp::{CdpSession, NetworkTracker, Transport, WAIT_FOR_NETWORK};
pub use chrome::{ChromeProcess, DebugEndpoint, MIN_CHROME_VERSION};
pub use config::{ChromeConfig, Endpoint, RemoteEndpoint};
pub use error::{Error, Result};
pub use render::{ContentSource, PrintParameters, RenderJob, Renderer};
pub use storage::{Storage, TempStorage};
pub use websocket::{ConnectOptions, DeflateConfig, Message, WsConnection};
