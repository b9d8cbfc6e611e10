//! Headless browser process lifecycle.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use sitechat_shared::{Result, SiteChatError};

const DEVTOOLS_BANNER: &str = "DevTools listening on ";

/// How long `close` waits for a graceful exit before killing the process.
const EXIT_GRACE: Duration = Duration::from_secs(5);

/// A spawned headless browser and its throwaway profile.
///
/// Dropping it without [`BrowserProcess::shutdown`] kills the browser and
/// still deletes the profile directory.
pub(crate) struct BrowserProcess {
    child: Child,
    profile_dir: PathBuf,
    /// Browser-level DevTools WebSocket endpoint.
    pub ws_url: String,
}

impl BrowserProcess {
    /// Spawn the browser and wait for its DevTools endpoint.
    pub(crate) async fn spawn(browser_path: &str, launch_timeout: Duration) -> Result<Self> {
        let profile_dir = std::env::temp_dir().join(format!("sitechat-profile-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&profile_dir).map_err(|e| {
            SiteChatError::HarvesterUnavailable(format!(
                "failed to create profile dir {}: {e}",
                profile_dir.display()
            ))
        })?;

        info!(browser_path, "launching headless browser");

        let spawned = Command::new(browser_path)
            .arg("--headless=new")
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--remote-debugging-port=0")
            .arg(format!("--user-data-dir={}", profile_dir.display()))
            .arg("about:blank")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                remove_profile(&profile_dir);
                return Err(SiteChatError::HarvesterUnavailable(format!(
                    "failed to launch `{browser_path}`: {e}. Is a Chromium-based browser installed?"
                )));
            }
        };

        let Some(stderr) = child.stderr.take() else {
            remove_profile(&profile_dir);
            return Err(SiteChatError::HarvesterUnavailable(
                "failed to capture browser stderr".into(),
            ));
        };
        let mut lines = BufReader::new(stderr).lines();

        let banner = tokio::time::timeout(launch_timeout, async {
            while let Some(line) = lines.next_line().await? {
                if let Some(ws_url) = parse_devtools_banner(&line) {
                    return Ok(Some(ws_url));
                }
                trace!(target: "sitechat::browser", "{line}");
            }
            Ok::<_, std::io::Error>(None)
        })
        .await;

        let failure = match banner {
            Ok(Ok(Some(ws_url))) => {
                // Keep draining stderr so the browser never blocks on a full pipe.
                tokio::spawn(async move {
                    while let Ok(Some(line)) = lines.next_line().await {
                        trace!(target: "sitechat::browser", "{line}");
                    }
                });
                debug!(%ws_url, "browser ready");
                return Ok(Self {
                    child,
                    profile_dir,
                    ws_url,
                });
            }
            Ok(Ok(None)) => "browser exited before announcing its DevTools endpoint".to_string(),
            Ok(Err(e)) => format!("failed to read browser output: {e}"),
            Err(_) => format!(
                "browser did not start within {}s",
                launch_timeout.as_secs()
            ),
        };

        let _ = child.kill().await;
        remove_profile(&profile_dir);
        Err(SiteChatError::HarvesterUnavailable(failure))
    }

    /// Wait briefly for the process to exit, kill it otherwise, and delete the profile.
    pub(crate) async fn shutdown(mut self) {
        match tokio::time::timeout(EXIT_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => debug!(%status, "browser exited"),
            Ok(Err(e)) => warn!(error = %e, "failed to wait for browser exit"),
            Err(_) => {
                warn!("browser did not exit in time, killing it");
                let _ = self.child.kill().await;
            }
        }
    }
}

impl Drop for BrowserProcess {
    fn drop(&mut self) {
        // No-op when the child has already been reaped.
        let _ = self.child.start_kill();
        remove_profile(&self.profile_dir);
    }
}

fn remove_profile(dir: &Path) {
    if let Err(e) = std::fs::remove_dir_all(dir) {
        debug!(dir = %dir.display(), error = %e, "failed to remove browser profile");
    }
}

/// Extract the WebSocket URL from the browser's startup banner line.
fn parse_devtools_banner(line: &str) -> Option<String> {
    let (_, rest) = line.split_once(DEVTOOLS_BANNER)?;
    let ws_url = rest.trim();
    ws_url.starts_with("ws://").then(|| ws_url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_devtools_banner() {
        let line = "DevTools listening on ws://127.0.0.1:40123/devtools/browser/9a1c-42";
        assert_eq!(
            parse_devtools_banner(line).as_deref(),
            Some("ws://127.0.0.1:40123/devtools/browser/9a1c-42")
        );
    }

    #[test]
    fn ignores_unrelated_stderr_lines() {
        assert!(parse_devtools_banner("[0101/000000.000:WARNING] something").is_none());
        assert!(parse_devtools_banner("DevTools listening on nothing").is_none());
    }

    /// A stand-in browser that announces an endpoint and then idles.
    #[cfg(unix)]
    fn fake_browser() -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = std::env::temp_dir().join(format!("sitechat-fake-browser-{}", Uuid::now_v7()));
        std::fs::write(
            &path,
            "#!/bin/sh\necho 'DevTools listening on ws://127.0.0.1:9/devtools/browser/test' >&2\nexec sleep 30\n",
        )
        .unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn dropping_the_process_removes_its_profile() {
        let browser = fake_browser();
        let process = BrowserProcess::spawn(browser.to_str().unwrap(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(process.ws_url, "ws://127.0.0.1:9/devtools/browser/test");

        let profile = process.profile_dir.clone();
        assert!(profile.exists());

        drop(process);
        assert!(!profile.exists());
        let _ = std::fs::remove_file(browser);
    }

    #[tokio::test]
    async fn missing_binary_is_harvester_unavailable() {
        let result = BrowserProcess::spawn(
            "/nonexistent/sitechat-test-browser",
            Duration::from_secs(1),
        )
        .await;
        let err = result.err().expect("spawn must fail");
        assert!(matches!(err, SiteChatError::HarvesterUnavailable(_)));
    }
}
