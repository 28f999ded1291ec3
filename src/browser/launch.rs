//! Launching a Chrome/Chromium process with remote debugging enabled, or
//! verifying connectivity to one that is already running.
//!
//! A debugging port and its user-data directory belong to exactly one
//! running browser process: launching against a port that already answers
//! fails fast instead of silently reusing the instance (connect to it with
//! [`crate::Browser::connect`] when that is what you want).

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use crate::cdp::discovery::{self, Endpoint};
use crate::error::{Result, WebtapError};

const READY_TIMEOUT: Duration = Duration::from_secs(10);
const READY_POLL: Duration = Duration::from_millis(300);

/// Options for launching a browser process.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Profile name, used in error messages only.
    pub profile: String,
    pub port: u16,
    pub user_data_dir: PathBuf,
    pub headless: bool,
    /// Explicit binary path; auto-detected when `None`.
    pub chrome_path: Option<PathBuf>,
}

/// A browser process we spawned, plus its debugging endpoint.
#[derive(Debug)]
pub struct LaunchedBrowser {
    pub child: Child,
    pub endpoint: Endpoint,
}

impl LaunchedBrowser {
    pub fn cdp_url(&self) -> String {
        self.endpoint.http_base()
    }
}

/// Spawn Chrome with `--remote-debugging-port` and a dedicated user-data
/// directory, then wait until the CDP endpoint answers.
pub async fn launch(opts: LaunchOptions) -> Result<LaunchedBrowser> {
    let endpoint = Endpoint {
        host: "127.0.0.1".to_string(),
        port: opts.port,
    };

    // Exclusivity: a port that already answers belongs to a running
    // instance of this profile.
    if discovery::probe_version(&endpoint).await?.is_some() {
        return Err(WebtapError::ProfileInUse {
            name: opts.profile,
            port: opts.port,
        });
    }

    let chrome = match opts.chrome_path {
        Some(p) => p,
        None => find_chrome().ok_or_else(|| {
            WebtapError::LaunchFailed("no Chrome/Chromium binary found".to_string())
        })?,
    };

    std::fs::create_dir_all(&opts.user_data_dir)?;

    let mut cmd = Command::new(&chrome);
    cmd.arg(format!("--remote-debugging-port={}", opts.port))
        .arg(format!("--user-data-dir={}", opts.user_data_dir.display()))
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .stdin(Stdio::null());
    if opts.headless {
        cmd.arg("--headless=new");
    }

    log::info!(
        "launching {} on port {} (profile dir {})",
        chrome.display(),
        opts.port,
        opts.user_data_dir.display()
    );
    let mut child = cmd
        .spawn()
        .map_err(|e| WebtapError::LaunchFailed(format!("{}: {e}", chrome.display())))?;

    // The process is up before its devtools server is; poll until the
    // version endpoint answers.
    let deadline = tokio::time::Instant::now() + READY_TIMEOUT;
    loop {
        if discovery::probe_version(&endpoint).await?.is_some() {
            return Ok(LaunchedBrowser { child, endpoint });
        }
        if tokio::time::Instant::now() >= deadline {
            let _ = child.kill();
            return Err(WebtapError::LaunchFailed(format!(
                "Chrome started but CDP not ready on port {} after {:?}. \
                 Is another process using the port?",
                opts.port, READY_TIMEOUT
            )));
        }
        tokio::time::sleep(READY_POLL).await;
    }
}

/// Auto-detect a Chromium-family binary: well-known install locations
/// first, then a PATH search.
pub fn find_chrome() -> Option<PathBuf> {
    for candidate in chrome_candidates() {
        let p = PathBuf::from(&candidate);
        if p.is_file() {
            return Some(p);
        }
    }

    let path_var = std::env::var_os("PATH")?;
    for name in [
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
        "brave-browser",
        "microsoft-edge",
    ] {
        for dir in std::env::split_paths(&path_var) {
            let p = dir.join(name);
            if p.is_file() {
                return Some(p);
            }
        }
    }
    None
}

fn chrome_candidates() -> Vec<String> {
    let mut paths = Vec::new();

    #[cfg(target_os = "macos")]
    {
        paths.push("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome".into());
        paths.push("/Applications/Chromium.app/Contents/MacOS/Chromium".into());
        paths.push("/Applications/Brave Browser.app/Contents/MacOS/Brave Browser".into());
        paths.push("/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge".into());
    }

    #[cfg(target_os = "linux")]
    {
        paths.push("/usr/bin/google-chrome".into());
        paths.push("/usr/bin/google-chrome-stable".into());
        paths.push("/usr/bin/chromium".into());
        paths.push("/usr/bin/chromium-browser".into());
        paths.push("/snap/bin/chromium".into());
        paths.push("/usr/bin/brave-browser".into());
        paths.push("/usr/bin/microsoft-edge".into());
    }

    #[cfg(windows)]
    {
        for var in ["ProgramFiles", "ProgramFiles(x86)", "LOCALAPPDATA"] {
            if let Ok(base) = std::env::var(var) {
                paths.push(format!("{base}\\Google\\Chrome\\Application\\chrome.exe"));
                paths.push(format!("{base}\\Microsoft\\Edge\\Application\\msedge.exe"));
            }
        }
    }

    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_exist_for_this_platform() {
        assert!(!chrome_candidates().is_empty());
    }

    #[tokio::test]
    async fn launch_fails_fast_when_port_in_use() {
        // Fake an already-running browser: a listener that answers the
        // version probe. Launching against its port must fail fast with
        // ProfileInUse, never spawn a second process.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        std::thread::spawn(move || {
            use std::io::{Read, Write};
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf);
                let body = r#"{"Browser":"FakeChrome/1.0"}"#;
                let _ = write!(
                    stream,
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
            }
        });

        let opts = LaunchOptions {
            profile: "test".into(),
            port,
            user_data_dir: std::env::temp_dir().join("webtap-test-never-created"),
            headless: true,
            chrome_path: Some(PathBuf::from("/nonexistent/chrome")),
        };
        let err = launch(opts).await.unwrap_err();
        assert!(matches!(err, WebtapError::ProfileInUse { port: p, .. } if p == port));
    }
}
