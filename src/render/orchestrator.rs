//! Render orchestration.
//!
//! Drives a whole render end to end: pick an endpoint (remote first,
//! launched binary as fallback), open the browser session, create a
//! target, drive the page session through load, network idle and the
//! print-media layout pass, print, and tear everything down again.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::cdp::{CdpSession, Transport, WAIT_FOR_NETWORK};
use crate::chrome::{self, ChromeProcess};
use crate::config::{ChromeConfig, Endpoint, RemoteEndpoint};
use crate::error::{Error, Result};
use crate::storage::{Storage, TempStorage};
use crate::websocket::{ConnectOptions, WsConnection};

use super::job::{ContentSource, RenderJob};

// ============================================================================
// Constants
// ============================================================================

/// Socket timeout for the page session. Large documents can keep the
/// browser busy for minutes before `printToPDF` answers.
const PAGE_TIMEOUT: Duration = Duration::from_secs(300);

/// Storage entry backing `$HOME` of a launched browser.
const HOME_DIR: &str = "HOME";

/// Evaluation budget for each layout script, in milliseconds.
const LAYOUT_EVAL_TIMEOUT_MS: u64 = 1000;

/// Kicks off the document's own layout pass, queued so it runs after
/// the media switch has settled.
const LAYOUT_TRIGGER: &str = "setTimeout(() => new Layout().apply(), 0)";

/// Resolves once the document signals finished layout, or rejects
/// after ten seconds. Documents that never set the marker reject and
/// get printed as-is.
const WAIT_FOR_LAYOUT: &str = r"
new Promise((fulfill, reject) => {
    let timeoutId = setTimeout(() => reject('fail'), 10000);

    if (document.documentElement.dataset.layoutReady === 'yes') {
        clearTimeout(timeoutId);
        fulfill();
        return;
    }

    document.addEventListener('layout-ready', e => {
        clearTimeout(timeoutId);
        fulfill();
    }, {once: true});
})
";

// ============================================================================
// Renderer
// ============================================================================

/// Renders documents to PDF through a headless browser.
pub struct Renderer {
    config: ChromeConfig,
    storage: Arc<dyn Storage>,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Renderer {
    /// Creates a renderer with temporary storage.
    pub fn new(config: ChromeConfig) -> Result<Self> {
        config.ensure_usable()?;
        Ok(Self {
            config,
            storage: Arc::new(TempStorage::new()?),
        })
    }

    /// Creates a renderer backed by caller-provided storage.
    pub fn with_storage(config: ChromeConfig, storage: Arc<dyn Storage>) -> Result<Self> {
        config.ensure_usable()?;
        Ok(Self { config, storage })
    }

    /// Detects the browser's major version, remote first.
    pub async fn version(&self) -> Result<u32> {
        let mut last_error = None;
        for endpoint in self.config.endpoints() {
            let attempt = match &endpoint {
                Endpoint::Remote(remote) => {
                    chrome::remote_version(&remote.host, remote.port).await
                }
                Endpoint::Local(binary) => chrome::local_version(binary).await,
            };
            match attempt {
                Ok(version) => return Ok(version),
                Err(e) => {
                    debug!(endpoint = ?endpoint, error = %e, "Version detection failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| Error::config("No endpoint available for version detection")))
    }

    /// Detects the version and gates it against the supported minimum.
    pub async fn validate(&self) -> Result<u32> {
        chrome::ensure_supported(self.version().await?)
    }

    /// Renders one job to PDF bytes.
    ///
    /// When both a remote endpoint and a binary are configured, any
    /// remote failure falls back to launching the binary.
    pub async fn render(&self, job: &RenderJob) -> Result<Vec<u8>> {
        let mut endpoints = self.config.endpoints().into_iter();
        let Some(first) = endpoints.next() else {
            return Err(Error::config(
                "Neither a remote endpoint nor a local binary is configured",
            ));
        };

        match first {
            Endpoint::Local(binary) => self.render_local(&binary, job).await,
            Endpoint::Remote(remote) => match self.render_remote(&remote, job).await {
                Ok(pdf) => Ok(pdf),
                Err(e) => match endpoints.next() {
                    Some(Endpoint::Local(binary)) => {
                        warn!(
                            host = %remote.host,
                            port = remote.port,
                            error = %e,
                            "Failed to render on remote browser; falling back to local binary"
                        );
                        self.render_local(&binary, job).await
                    }
                    _ => Err(e),
                },
            },
        }
    }

    /// Renders one job and stores the PDF as a file.
    pub async fn render_to_file(&self, job: &RenderJob) -> Result<std::path::PathBuf> {
        let pdf = self.render(job).await?;
        let name = TempStorage::unique_name("pdf");
        let path = self.storage.create(&name, &pdf)?;
        info!(path = %path.display(), bytes = pdf.len(), "Stored rendered PDF");
        Ok(path)
    }

    async fn render_remote(&self, remote: &RemoteEndpoint, job: &RenderJob) -> Result<Vec<u8>> {
        let version = chrome::json_version(&remote.host, remote.port).await?;
        let debugger_url = version
            .get("webSocketDebuggerUrl")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::protocol(format!("Version probe without debugger URL: {version}"))
            })?;
        let browser_id = chrome::browser_id_from_debugger_url(debugger_url)?;

        debug!(host = %remote.host, port = remote.port, "Rendering on remote browser");
        self.print_to_pdf(&format!("{}:{}", remote.host, remote.port), browser_id, job)
            .await
    }

    async fn render_local(&self, binary: &std::path::Path, job: &RenderJob) -> Result<Vec<u8>> {
        let home = self.storage.resolve_dir(HOME_DIR)?;
        let process = ChromeProcess::launch(binary, &home).await?;
        let endpoint = process.endpoint().clone();

        let result = self
            .print_to_pdf(&endpoint.socket, &endpoint.browser_id, job)
            .await;
        if let Err(e) = &result {
            error!(error = %e, "Failed to render PDF");
        }

        // The browser dies either way; a failed kill only matters if
        // the render itself succeeded.
        match process.terminate().await {
            Ok(()) => result,
            Err(e) => {
                warn!(error = %e, "Failed to terminate browser");
                result
            }
        }
    }

    async fn print_to_pdf(&self, socket: &str, browser_id: &str, job: &RenderJob) -> Result<Vec<u8>> {
        let browser_uri = parse_ws_uri(&format!("ws://{socket}/devtools/browser/{browser_id}"))?;
        let mut browser = CdpSession::new(WsConnection::connect(&browser_uri).await?);

        let created = browser
            .call("Target.createTarget", json!({"url": "about:blank"}))
            .await?;
        let target_id = created
            .get("targetId")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::protocol(format!("Expected target id. Got instead: {created}")))?
            .to_string();
        debug!(target_id = %target_id, "Created print target");

        let page_uri = parse_ws_uri(&format!("ws://{socket}/devtools/page/{target_id}"))?;
        let options = ConnectOptions::default().timeout(PAGE_TIMEOUT);
        let mut page = CdpSession::new(WsConnection::connect_with(&page_uri, options).await?);

        let printed = drive_page(&mut page, &target_id, job).await;
        if let Err(e) = page.close().await {
            debug!(error = %e, "Failed to close page connection");
        }
        let pdf = printed?;

        let closed = browser
            .call("Target.closeTarget", json!({"targetId": target_id}))
            .await?;
        if closed.get("success").and_then(Value::as_bool) != Some(true) {
            return Err(Error::protocol(format!(
                "Expected close confirmation. Got instead: {closed}"
            )));
        }

        // The browser may drop the connection instead of acknowledging.
        if let Err(e) = browser.close().await {
            debug!(error = %e, "Failed to close browser connection");
        }

        Ok(pdf)
    }
}

// ============================================================================
// Page flow
// ============================================================================

/// Loads the job's content into the page and prints it.
///
/// Generic over the transport so the whole flow is testable against a
/// scripted session.
async fn drive_page<T: Transport>(
    page: &mut CdpSession<T>,
    target_id: &str,
    job: &RenderJob,
) -> Result<Vec<u8>> {
    page.call("Log.enable", json!({})).await?;
    page.call("Network.enable", json!({})).await?;
    page.call("Page.enable", json!({})).await?;
    // Deprecated domain; newer browsers may reject it.
    if let Err(e) = page.call("Console.enable", json!({})).await {
        debug!(error = %e, "Console domain unavailable");
    }

    match &job.source {
        ContentSource::Url(url) => {
            let result = page.call("Page.navigate", json!({"url": url})).await?;
            let frame_id = result
                .get("frameId")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    Error::protocol(format!("Expected navigation frame. Got instead: {result}"))
                })?
                .to_string();
            page.await_event("Page.frameStoppedLoading", Some(&json!({"frameId": frame_id})))
                .await?;
        }
        ContentSource::InlineHtml(html) => {
            // The blank target's frame id equals the target id.
            page.call(
                "Page.setDocumentContent",
                json!({"frameId": target_id, "html": html}),
            )
            .await?;
            page.await_event("Page.loadEventFired", None).await?;
        }
    }

    page.await_event(WAIT_FOR_NETWORK, None).await?;

    if job.is_inline() {
        settle_layout(page).await?;
    }

    let result = page.call("Page.printToPDF", print_params(job)).await?;
    let data = result
        .get("data")
        .and_then(Value::as_str)
        .filter(|data| !data.is_empty())
        .ok_or_else(|| Error::protocol(format!("Expected base64 data. Got instead: {result}")))?;
    let pdf = BASE64
        .decode(data)
        .map_err(|e| Error::protocol(format!("Invalid base64 PDF payload: {e}")))?;
    debug!(bytes = pdf.len(), "Received PDF data");
    Ok(pdf)
}

/// Switches the page to print media, runs its layout pass and waits
/// for the ready signal before switching back.
///
/// A rejected or failed layout promise is reported but never fails the
/// render; the document is printed as it stands.
async fn settle_layout<T: Transport>(page: &mut CdpSession<T>) -> Result<()> {
    page.call("Emulation.setEmulatedMedia", json!({"media": "print"}))
        .await?;
    page.call(
        "Runtime.evaluate",
        json!({"timeout": LAYOUT_EVAL_TIMEOUT_MS, "expression": LAYOUT_TRIGGER}),
    )
    .await?;

    let promised = page
        .call(
            "Runtime.evaluate",
            json!({
                "awaitPromise": true,
                "returnByValue": true,
                "timeout": LAYOUT_EVAL_TIMEOUT_MS,
                "expression": WAIT_FOR_LAYOUT,
            }),
        )
        .await?;
    if let Some(details) = promised.get("exceptionDetails") {
        match details
            .pointer("/exception/description")
            .and_then(Value::as_str)
        {
            Some(description) => error!(description, "Failed to wait for layout"),
            None => warn!("Failed to wait for layout. Pages might look skewed."),
        }
    }

    page.call("Emulation.setEmulatedMedia", json!({"media": ""}))
        .await?;
    Ok(())
}

/// Job parameters merged with the fixed print settings.
fn print_params(job: &RenderJob) -> Value {
    let mut params = job.parameters.to_cdp_params();
    if let Some(map) = params.as_object_mut() {
        map.insert("transferMode".to_string(), json!("ReturnAsBase64"));
        map.insert("printBackground".to_string(), json!(true));
    }
    params
}

fn parse_ws_uri(uri: &str) -> Result<Url> {
    Url::parse(uri).map_err(|e| Error::config(format!("Invalid endpoint URI {uri:?}: {e}")))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::cdp::session::testing::ScriptedTransport;
    use crate::render::job::PrintParameters;

    fn reply(id: u64, result: Value) -> String {
        json!({"id": id, "result": result}).to_string()
    }

    fn event(method: &str, params: Value) -> String {
        json!({"method": method, "params": params}).to_string()
    }

    fn pdf_base64() -> String {
        BASE64.encode(b"%PDF-1.4 fake document")
    }

    #[test]
    fn test_print_params_overrides() {
        let job = RenderJob::from_url("http://localhost/")
            .with_parameters(PrintParameters::new().landscape(true));
        let params = print_params(&job);
        assert_eq!(params["transferMode"], "ReturnAsBase64");
        assert_eq!(params["printBackground"], true);
        assert_eq!(params["landscape"], true);
    }

    #[test]
    fn test_parse_ws_uri_rejects_garbage() {
        assert!(parse_ws_uri("not a uri").is_err());
        assert!(parse_ws_uri("ws://127.0.0.1:9222/devtools/browser/abc").is_ok());
    }

    #[tokio::test]
    async fn test_drive_page_inline_document() {
        let script = [
            reply(1, json!({})), // Log.enable
            reply(2, json!({})), // Network.enable
            reply(3, json!({})), // Page.enable
            reply(4, json!({})), // Console.enable
            // A stylesheet starts loading while the content call is in
            // flight; network idle must wait for it.
            event(
                "Network.requestWillBeSent",
                json!({"requestId": "r1", "request": {"url": "http://x/a.css"}}),
            ),
            reply(5, json!({})), // Page.setDocumentContent
            event("Page.loadEventFired", json!({"timestamp": 1.0})),
            event("Network.loadingFinished", json!({"requestId": "r1"})),
            reply(6, json!({})), // Emulation.setEmulatedMedia print
            reply(7, json!({"result": {"type": "undefined"}})), // layout trigger
            reply(8, json!({"result": {"type": "undefined"}})), // layout promise
            reply(9, json!({})), // Emulation.setEmulatedMedia reset
            reply(10, json!({"data": pdf_base64()})), // Page.printToPDF
        ];
        let mut page = CdpSession::new(ScriptedTransport::new(script));
        let job = RenderJob::from_html("<p>hello</p>");

        let pdf = drive_page(&mut page, "target-1", &job).await.expect("render");
        assert!(pdf.starts_with(b"%PDF-"));

        let content_call: Value =
            serde_json::from_str(&page_outbound(&page)[4]).expect("json");
        assert_eq!(content_call["method"], "Page.setDocumentContent");
        assert_eq!(content_call["params"]["frameId"], "target-1");
    }

    #[tokio::test]
    async fn test_drive_page_url_document() {
        let script = [
            reply(1, json!({})),
            reply(2, json!({})),
            reply(3, json!({})),
            reply(4, json!({})),
            reply(5, json!({"frameId": "f7"})), // Page.navigate
            event("Page.frameStoppedLoading", json!({"frameId": "other"})),
            event("Page.frameStoppedLoading", json!({"frameId": "f7"})),
            reply(6, json!({"data": pdf_base64()})), // Page.printToPDF, no layout pass
        ];
        let mut page = CdpSession::new(ScriptedTransport::new(script));
        let job = RenderJob::from_url("http://localhost/report");

        let pdf = drive_page(&mut page, "target-1", &job).await.expect("render");
        assert!(pdf.starts_with(b"%PDF-"));

        // URL documents skip the print-media layout pass entirely.
        let outbound = page_outbound(&page);
        assert!(
            !outbound.iter().any(|text| text.contains("setEmulatedMedia")),
            "no media emulation for URL documents"
        );
    }

    #[tokio::test]
    async fn test_drive_page_tolerates_console_enable_failure() {
        let script = [
            reply(1, json!({})),
            reply(2, json!({})),
            reply(3, json!({})),
            json!({"id": 4, "error": {"code": -32601, "message": "'Console.enable' wasn't found"}})
                .to_string(),
            reply(5, json!({})),
            event("Page.loadEventFired", json!({"timestamp": 1.0})),
            reply(6, json!({})),
            reply(7, json!({"result": {"type": "undefined"}})),
            reply(8, json!({"result": {"type": "undefined"}})),
            reply(9, json!({})),
            reply(10, json!({"data": pdf_base64()})),
        ];
        let mut page = CdpSession::new(ScriptedTransport::new(script));
        let job = RenderJob::from_html("<p/>");

        let pdf = drive_page(&mut page, "t", &job).await.expect("render");
        assert!(pdf.starts_with(b"%PDF-"));
    }

    #[tokio::test]
    async fn test_drive_page_layout_exception_does_not_fail_render() {
        let script = [
            reply(1, json!({})),
            reply(2, json!({})),
            reply(3, json!({})),
            reply(4, json!({})),
            reply(5, json!({})),
            event("Page.loadEventFired", json!({"timestamp": 1.0})),
            reply(6, json!({})),
            reply(7, json!({"result": {"type": "undefined"}})),
            reply(
                8,
                json!({
                    "result": {"type": "string", "value": "fail"},
                    "exceptionDetails": {"exception": {"description": "fail"}},
                }),
            ),
            reply(9, json!({})),
            reply(10, json!({"data": pdf_base64()})),
        ];
        let mut page = CdpSession::new(ScriptedTransport::new(script));
        let job = RenderJob::from_html("<p/>");

        let pdf = drive_page(&mut page, "t", &job).await.expect("render");
        assert!(pdf.starts_with(b"%PDF-"));
    }

    #[tokio::test]
    async fn test_drive_page_empty_data_is_an_error() {
        let script = [
            reply(1, json!({})),
            reply(2, json!({})),
            reply(3, json!({})),
            reply(4, json!({})),
            reply(5, json!({"frameId": "f1"})),
            event("Page.frameStoppedLoading", json!({"frameId": "f1"})),
            reply(6, json!({"data": ""})),
        ];
        let mut page = CdpSession::new(ScriptedTransport::new(script));
        let job = RenderJob::from_url("http://localhost/");

        let err = drive_page(&mut page, "t", &job).await.expect_err("must fail");
        assert!(err.is_protocol_error());
    }

    fn page_outbound(session: &CdpSession<ScriptedTransport>) -> Vec<String> {
        session.transport_ref().outbound.clone()
    }
}
