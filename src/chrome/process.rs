//! Headless browser process supervision.
//!
//! Launches the binary with a fixed headless flag set and an ephemeral
//! debugging port, then scans its stderr for the `DevTools listening`
//! announcement that carries the actual socket address and browser id.
//! A browser that exits early or stays silent past the startup deadline
//! is reported as an error, and the child is killed in both the timeout
//! and the drop path.

// ============================================================================
// Imports
// ============================================================================

use std::path::Path;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, Command};
use tokio::time::timeout;
use tracing::{debug, error, trace};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// How long the browser gets to announce its debug endpoint.
pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Matches the stderr announcement, capturing socket address and
/// browser id.
static DEBUG_ADDR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"DevTools listening on ws://((?:\d+\.?){4}:\d+)/devtools/browser/([\w-]+)").unwrap()
});

// ============================================================================
// DebugEndpoint
// ============================================================================

/// The debug endpoint a freshly started browser announced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugEndpoint {
    /// Socket address, `host:port`.
    pub socket: String,
    /// Browser target id, the last path segment of the debugger URL.
    pub browser_id: String,
}

impl DebugEndpoint {
    /// Extracts the endpoint from one stderr line, if present.
    #[must_use]
    pub fn from_stderr_line(line: &str) -> Option<Self> {
        DEBUG_ADDR_PATTERN.captures(line).map(|caps| Self {
            socket: caps[1].to_string(),
            browser_id: caps[2].to_string(),
        })
    }
}

// ============================================================================
// ChromeProcess
// ============================================================================

/// A supervised headless browser child process.
///
/// The child is spawned with `kill_on_drop`, so even an aborted render
/// cannot leak a browser.
#[derive(Debug)]
pub struct ChromeProcess {
    child: Child,
    endpoint: DebugEndpoint,
}

impl ChromeProcess {
    /// Launches the browser and waits for its debug endpoint, with the
    /// default startup deadline.
    pub async fn launch(binary: &Path, home: &Path) -> Result<Self> {
        Self::launch_with_timeout(binary, home, STARTUP_TIMEOUT).await
    }

    /// Launches the browser and waits for its debug endpoint.
    ///
    /// `home` backs both `$HOME` and the user data dir, keeping all
    /// browser state inside a caller-controlled directory.
    ///
    /// # Errors
    ///
    /// - [`Error::BinaryNotFound`] when `binary` does not exist
    /// - [`Error::ProcessStart`] when the browser exits before
    ///   announcing an endpoint
    /// - [`Error::StartupTimeout`] when the deadline passes first; the
    ///   child is killed and reaped before this returns
    pub async fn launch_with_timeout(
        binary: &Path,
        home: &Path,
        startup_timeout: Duration,
    ) -> Result<Self> {
        if !binary.exists() {
            return Err(Error::binary_not_found(binary));
        }

        debug!(binary = %binary.display(), home = %home.display(), "Starting browser");
        let mut child = Command::new(binary)
            .arg("--bwsi")
            .arg("--headless")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--no-first-run")
            .arg("--disable-dev-shm-usage")
            .arg("--remote-debugging-port=0")
            .arg(format!("--homedir={}", home.display()))
            .arg(format!("--user-data-dir={}", home.display()))
            .env("HOME", home)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => Error::binary_not_found(binary),
                _ => Error::process_start(format!("Failed to spawn browser: {e}")),
            })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::process_start("Browser stderr was not captured"))?;
        let mut lines = BufReader::new(stderr).lines();

        match timeout(startup_timeout, scan_for_endpoint(&mut lines)).await {
            Ok(Ok(Some(endpoint))) => {
                debug!(
                    socket = %endpoint.socket,
                    browser_id = %endpoint.browser_id,
                    "Browser announced debug endpoint"
                );
                // Keep draining stderr so the pipe never fills up.
                tokio::spawn(async move {
                    while let Ok(Some(line)) = lines.next_line().await {
                        trace!(line = %line, "Browser output");
                    }
                });
                Ok(Self { child, endpoint })
            }
            Ok(Ok(None)) => {
                // Stderr can close while the process lives on; kill
                // before reaping so the wait is bounded.
                if let Err(e) = child.start_kill() {
                    debug!(error = %e, "Kill signal failed; browser may have exited already");
                }
                let status = child.wait().await?;
                Err(Error::process_start(format!(
                    "Browser stopped its output with {status} before announcing a debug endpoint"
                )))
            }
            Ok(Err(e)) => {
                reap(&mut child).await;
                Err(e.into())
            }
            Err(_) => {
                error!(
                    timeout_ms = startup_timeout.as_millis() as u64,
                    "Browser did not announce a debug endpoint in time"
                );
                reap(&mut child).await;
                Err(Error::startup_timeout(startup_timeout.as_millis() as u64))
            }
        }
    }

    /// The endpoint announced at startup.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &DebugEndpoint {
        &self.endpoint
    }

    /// OS process id, while the child is alive.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Kills the browser and waits for it to be reaped.
    pub async fn terminate(mut self) -> Result<()> {
        if let Err(e) = self.child.start_kill() {
            debug!(error = %e, "Kill signal failed; browser may have exited already");
        }
        let status = self.child.wait().await?;
        debug!(code = status.code(), "Browser terminated");
        Ok(())
    }
}

/// Reads stderr lines until the endpoint announcement or EOF.
async fn scan_for_endpoint(
    lines: &mut Lines<BufReader<ChildStderr>>,
) -> std::io::Result<Option<DebugEndpoint>> {
    while let Some(line) = lines.next_line().await? {
        debug!(line = %line, "Browser output");
        if let Some(endpoint) = DebugEndpoint::from_stderr_line(&line) {
            return Ok(Some(endpoint));
        }
    }
    Ok(None)
}

async fn reap(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "Kill signal failed; browser may have exited already");
    }
    if let Err(e) = child.wait().await {
        debug!(error = %e, "Failed to reap browser process");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_pattern_matches_announcement() {
        let line =
            "DevTools listening on ws://127.0.0.1:33941/devtools/browser/0b604f53-10d5-4bbb-aa32-178c75f7d7b5";
        let endpoint = DebugEndpoint::from_stderr_line(line).expect("must match");
        assert_eq!(endpoint.socket, "127.0.0.1:33941");
        assert_eq!(endpoint.browser_id, "0b604f53-10d5-4bbb-aa32-178c75f7d7b5");
    }

    #[test]
    fn test_endpoint_pattern_rejects_noise() {
        assert!(DebugEndpoint::from_stderr_line("[WARNING] gpu init failed").is_none());
        assert!(DebugEndpoint::from_stderr_line("DevTools listening on ws://nonsense").is_none());
    }

    #[tokio::test]
    async fn test_launch_missing_binary() {
        let home = tempfile::tempdir().expect("tempdir");
        let err = ChromeProcess::launch(Path::new("/nonexistent/google-chrome"), home.path())
            .await
            .expect_err("must fail");
        assert!(matches!(err, Error::BinaryNotFound { .. }));
    }

    #[cfg(unix)]
    mod unix {
        use std::os::unix::fs::PermissionsExt;

        use super::*;

        fn fake_browser(dir: &Path, body: &str) -> std::path::PathBuf {
            let path = dir.join("fake-chrome");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
                .expect("chmod");
            path
        }

        #[tokio::test]
        async fn test_launch_parses_endpoint_and_terminates() {
            let dir = tempfile::tempdir().expect("tempdir");
            let binary = fake_browser(
                dir.path(),
                "echo 'DevTools listening on ws://127.0.0.1:9229/devtools/browser/test-id' >&2\n\
                 exec sleep 30",
            );

            let process = ChromeProcess::launch(&binary, dir.path()).await.expect("launch");
            assert_eq!(process.endpoint().socket, "127.0.0.1:9229");
            assert_eq!(process.endpoint().browser_id, "test-id");
            assert!(process.pid().is_some());
            process.terminate().await.expect("terminate");
        }

        #[tokio::test]
        async fn test_launch_premature_exit() {
            let dir = tempfile::tempdir().expect("tempdir");
            let binary = fake_browser(dir.path(), "echo 'no endpoint here' >&2\nexit 1");

            let err = ChromeProcess::launch(&binary, dir.path())
                .await
                .expect_err("must fail");
            assert!(matches!(err, Error::ProcessStart { .. }));
        }

        #[tokio::test]
        async fn test_closed_stderr_with_live_child_fails_promptly() {
            let dir = tempfile::tempdir().expect("tempdir");
            let pid_file = dir.path().join("pid");
            // Closes stderr but keeps running; the launch must not
            // block on a child that never exits by itself.
            let binary = fake_browser(
                dir.path(),
                &format!("echo $$ > {}\nexec 2>&-\nexec sleep 20", pid_file.display()),
            );

            let result = timeout(
                Duration::from_secs(3),
                ChromeProcess::launch_with_timeout(&binary, dir.path(), Duration::from_millis(500)),
            )
            .await
            .expect("launch must return promptly");
            let err = result.expect_err("must fail");
            assert!(matches!(err, Error::ProcessStart { .. }));

            let pid = std::fs::read_to_string(&pid_file)
                .expect("pid file")
                .trim()
                .to_string();
            assert!(!Path::new(&format!("/proc/{pid}")).exists());
        }

        #[tokio::test]
        async fn test_launch_timeout_kills_child() {
            let dir = tempfile::tempdir().expect("tempdir");
            let pid_file = dir.path().join("pid");
            let binary = fake_browser(
                dir.path(),
                &format!("echo $$ > {}\nexec sleep 30", pid_file.display()),
            );

            let err = ChromeProcess::launch_with_timeout(
                &binary,
                dir.path(),
                Duration::from_millis(300),
            )
            .await
            .expect_err("must time out");
            assert!(err.is_timeout());

            // The child was killed and reaped before the error returned.
            let pid = std::fs::read_to_string(&pid_file)
                .expect("pid file")
                .trim()
                .to_string();
            assert!(!Path::new(&format!("/proc/{pid}")).exists());
        }
    }
}
