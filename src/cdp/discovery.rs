//! Target discovery over the debugging port's HTTP endpoint.
//!
//! Chrome serves `GET /json/list` (one entry per target) and
//! `GET /json/version` (browser metadata including the browser-level
//! WebSocket URL). Discovery is how a session finds page targets before any
//! WebSocket exists.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, WebtapError};

const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Discovery requests are tiny and local; a hung endpoint should fail the
/// call, not the caller's patience.
fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| WebtapError::Connection(format!("cannot build HTTP client: {e}")))
}

/// One CDP target as advertised by `/json/list`.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetInfo {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(rename = "webSocketDebuggerUrl", default)]
    pub ws_url: Option<String>,
}

impl TargetInfo {
    /// WebSocket URL for this target, pinned to the configured host and
    /// port. Chrome sometimes advertises a hostname that is not reachable
    /// from the controlling side, so the advertised URL's host is ignored.
    pub fn page_ws_url(&self, host: &str, port: u16) -> String {
        format!("ws://{host}:{port}/devtools/page/{}", self.id)
    }
}

/// A parsed `host:port` debugging endpoint.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Parse an endpoint URL like `http://127.0.0.1:9222`. A bare
    /// `host:port` is accepted too.
    pub fn parse(cdp_url: &str) -> Result<Self> {
        let stripped = cdp_url
            .trim_end_matches('/')
            .trim_start_matches("http://")
            .trim_start_matches("https://");
        let (host, port) = stripped
            .rsplit_once(':')
            .ok_or_else(|| WebtapError::Connection(format!("no port in CDP URL: {cdp_url}")))?;
        let port = port
            .parse::<u16>()
            .map_err(|_| WebtapError::Connection(format!("bad port in CDP URL: {cdp_url}")))?;
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    pub fn http_base(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Fetch all targets from `/json/list`.
pub async fn fetch_targets(endpoint: &Endpoint) -> Result<Vec<TargetInfo>> {
    let url = format!("{}/json/list", endpoint.http_base());
    let resp = http_client()?
        .get(&url)
        .send()
        .await
        .map_err(|_| unreachable_err(endpoint))?;
    resp.json::<Vec<TargetInfo>>()
        .await
        .map_err(|e| WebtapError::Connection(format!("bad /json/list response: {e}")))
}

/// Fetch page-type targets only, in the browser's order. Background
/// targets (service workers, extensions, devtools itself) are filtered
/// out — the catalog and tab operations only ever address real tabs.
pub async fn fetch_pages(endpoint: &Endpoint) -> Result<Vec<TargetInfo>> {
    let targets = fetch_targets(endpoint).await?;
    Ok(targets
        .into_iter()
        .filter(|t| t.kind == "page" && !t.url.starts_with("devtools://"))
        .collect())
}

/// Probe `/json/version`. `Ok(Some)` means a browser answers on this
/// endpoint; `Ok(None)` means nothing is listening.
pub async fn probe_version(endpoint: &Endpoint) -> Result<Option<Value>> {
    let url = format!("{}/json/version", endpoint.http_base());
    match http_client()?.get(&url).send().await {
        Ok(resp) => {
            let v = resp
                .json::<Value>()
                .await
                .map_err(|e| WebtapError::Connection(format!("bad /json/version response: {e}")))?;
            Ok(Some(v))
        }
        Err(e) if e.is_connect() => Ok(None),
        Err(e) => Err(WebtapError::Connection(format!("version probe failed: {e}"))),
    }
}

fn unreachable_err(endpoint: &Endpoint) -> WebtapError {
    WebtapError::BrowserUnreachable {
        cdp_url: endpoint.http_base(),
        port: endpoint.port,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_url() {
        let ep = Endpoint::parse("http://127.0.0.1:9222").unwrap();
        assert_eq!(ep.host, "127.0.0.1");
        assert_eq!(ep.port, 9222);
        assert_eq!(ep.http_base(), "http://127.0.0.1:9222");
    }

    #[test]
    fn parse_bare_host_port() {
        let ep = Endpoint::parse("localhost:9333/").unwrap();
        assert_eq!(ep.host, "localhost");
        assert_eq!(ep.port, 9333);
    }

    #[test]
    fn parse_rejects_missing_port() {
        assert!(Endpoint::parse("http://localhost").is_err());
        assert!(Endpoint::parse("localhost:notaport").is_err());
    }

    #[test]
    fn page_ws_url_ignores_advertised_host() {
        let t = TargetInfo {
            id: "ABC123".into(),
            title: String::new(),
            url: String::new(),
            kind: "page".into(),
            ws_url: Some("ws://evil.example:1/devtools/page/ABC123".into()),
        };
        assert_eq!(
            t.page_ws_url("127.0.0.1", 9222),
            "ws://127.0.0.1:9222/devtools/page/ABC123"
        );
    }
}
