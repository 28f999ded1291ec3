//! The browser session: target discovery, attachment, tabs and navigation.
//!
//! A [`Browser`] is an explicit session object — no module-level state — so
//! several sessions against different profiles/ports coexist safely. Within
//! one session all scan/interaction calls are serialized by an internal
//! lock: concurrent scans against one target would overwrite each other's
//! index stamps.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::cdp::discovery::{self, Endpoint, TargetInfo};
use crate::cdp::CdpTransport;
use crate::error::{Result, WebtapError};
use crate::page::scan::Element;
use crate::page::Page;

const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(10);

/// One open tab, numbered for the caller.
#[derive(Debug, Clone)]
pub struct Tab {
    pub index: usize,
    pub id: String,
    pub title: String,
    pub url: String,
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = if self.title.is_empty() {
            "(untitled)"
        } else {
            &self.title
        };
        write!(f, "[{}] {} — {}", self.index, title, self.url)
    }
}

#[derive(Default)]
struct Inner {
    /// Currently attached page, if any. Re-validated on every call.
    page: Option<Page>,
    /// Length of the last catalog built for the current target. `None`
    /// until the first scan and after every navigation.
    catalog_len: Option<usize>,
}

/// High-level control of one running browser instance.
pub struct Browser {
    endpoint: Endpoint,
    nav_timeout: Duration,
    inner: Mutex<Inner>,
}

impl fmt::Debug for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Browser")
            .field("endpoint", &self.endpoint)
            .field("nav_timeout", &self.nav_timeout)
            .finish_non_exhaustive()
    }
}

impl Browser {
    /// Connect to a browser's debugging endpoint (e.g.
    /// `http://127.0.0.1:9222`). Verifies something is actually listening.
    pub async fn connect(cdp_url: &str) -> Result<Self> {
        let endpoint = Endpoint::parse(cdp_url)?;
        if discovery::probe_version(&endpoint).await?.is_none() {
            return Err(WebtapError::BrowserUnreachable {
                cdp_url: endpoint.http_base(),
                port: endpoint.port,
            });
        }
        Ok(Self {
            endpoint,
            nav_timeout: NAVIGATION_TIMEOUT,
            inner: Mutex::new(Inner::default()),
        })
    }

    /// Override how long [`Browser::open`] waits for the load event.
    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.nav_timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Whether the browser still answers on its debugging port.
    pub async fn is_alive(&self) -> bool {
        matches!(discovery::probe_version(&self.endpoint).await, Ok(Some(_)))
    }

    // ── Tabs ──

    /// List open tabs (page targets only).
    pub async fn tabs(&self) -> Result<Vec<Tab>> {
        let pages = discovery::fetch_pages(&self.endpoint).await?;
        Ok(pages
            .into_iter()
            .enumerate()
            .map(|(index, t)| Tab {
                index,
                id: t.id,
                title: t.title,
                url: t.url,
            })
            .collect())
    }

    /// Switch the session to the tab at `index` and raise it.
    pub async fn switch_to(&self, index: usize) -> Result<String> {
        let target = self.target_by_index(index).await?;
        let mut guard = self.inner.lock().await;
        let page = self.attach(&target).await?;
        page.transport.send("Page.bringToFront", json!({})).await?;
        guard.page = Some(page);
        guard.catalog_len = None;
        Ok(format!(
            "Switched to tab [{}]: {} — {}",
            index, target.title, target.url
        ))
    }

    /// Attach to a tab by its CDP target id and make it current.
    pub async fn attach_target(&self, target_id: &str) -> Result<String> {
        let pages = discovery::fetch_pages(&self.endpoint).await?;
        let target = pages
            .into_iter()
            .find(|t| t.id == target_id)
            .ok_or_else(|| WebtapError::TargetNotFound(target_id.to_string()))?;
        let mut guard = self.inner.lock().await;
        let page = self.attach(&target).await?;
        guard.page = Some(page);
        guard.catalog_len = None;
        Ok(format!("Attached to {} — {}", target.id, target.url))
    }

    /// Open a new tab, optionally at `url`. Other targets are unaffected.
    pub async fn new_tab(&self, url: Option<&str>) -> Result<String> {
        let transport = self.browser_transport().await?;
        let result = transport
            .send(
                "Target.createTarget",
                json!({ "url": url.unwrap_or("about:blank") }),
            )
            .await?;
        let id = result
            .get("targetId")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Ok(format!("Opened new tab: {id}"))
    }

    /// Close the tab at `index`, or the current tab when `None`.
    pub async fn close_tab(&self, index: Option<usize>) -> Result<String> {
        let target = match index {
            Some(i) => self.target_by_index(i).await?,
            None => self.current_target().await?,
        };

        let transport = self.browser_transport().await?;
        transport
            .send("Target.closeTarget", json!({ "targetId": target.id }))
            .await?;

        // Drop the attachment if we just closed the tab under it.
        let mut guard = self.inner.lock().await;
        if guard
            .page
            .as_ref()
            .is_some_and(|p| p.target_id() == target.id)
        {
            guard.page = None;
            guard.catalog_len = None;
        }
        Ok(format!("Closed tab: {}", target.title))
    }

    // ── Navigation ──

    /// Navigate the current tab and wait (bounded) for the load event.
    ///
    /// A timeout surfaces as [`WebtapError::NavigationTimeout`] but the
    /// navigation itself is not cancelled and the target stays usable —
    /// the caller may re-scan a partially loaded page. Either way the old
    /// catalog is invalidated.
    pub async fn open(&self, url: &str) -> Result<String> {
        let url = normalize_url(url);
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        self.ensure_attached(inner).await?;
        inner.catalog_len = None;
        let page = inner.page.as_ref().expect("attached above");

        page.transport.send("Page.enable", json!({})).await?;
        let (result, fired) = page
            .transport
            .send_and_wait_event(
                "Page.navigate",
                json!({ "url": url }),
                "Page.loadEventFired",
                self.nav_timeout,
            )
            .await?;

        if let Some(err) = result.get("errorText").and_then(Value::as_str) {
            if !err.is_empty() {
                return Err(WebtapError::Cdp {
                    method: "Page.navigate".into(),
                    message: err.to_string(),
                });
            }
        }
        if !fired {
            return Err(WebtapError::NavigationTimeout { url });
        }
        Ok(format!("Navigated to {url}"))
    }

    /// URL of the current tab.
    pub async fn url(&self) -> Result<String> {
        Ok(self.current_target().await?.url)
    }

    /// Go back one entry in the tab's history.
    pub async fn back(&self) -> Result<String> {
        self.history_step(-1).await
    }

    /// Go forward one entry in the tab's history.
    pub async fn forward(&self) -> Result<String> {
        self.history_step(1).await
    }

    /// Reload the current tab.
    pub async fn refresh(&self) -> Result<String> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        self.ensure_attached(inner).await?;
        inner.catalog_len = None;
        let page = inner.page.as_ref().expect("attached above");
        page.transport.send("Page.reload", json!({})).await?;
        Ok("Refreshed.".to_string())
    }

    async fn history_step(&self, delta: i64) -> Result<String> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        self.ensure_attached(inner).await?;
        inner.catalog_len = None;
        let page = inner.page.as_ref().expect("attached above");

        let hist = page
            .transport
            .send("Page.getNavigationHistory", json!({}))
            .await?;
        let current = hist
            .get("currentIndex")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let entries = hist
            .get("entries")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let step_to = current + delta;
        if step_to < 0 || step_to as usize >= entries.len() {
            let edge = if delta < 0 { "first" } else { "last" };
            return Ok(format!("Already at {edge} page in history."));
        }
        let entry = &entries[step_to as usize];
        let entry_id = entry.get("id").and_then(Value::as_i64).unwrap_or(0);
        let entry_url = entry.get("url").and_then(Value::as_str).unwrap_or("");

        page.transport
            .send("Page.navigateToHistoryEntry", json!({ "entryId": entry_id }))
            .await?;
        let word = if delta < 0 { "Back" } else { "Forward" };
        Ok(format!("{word} to: {entry_url}"))
    }

    // ── Element catalog + interaction ──

    /// Scan the current tab into a fresh numbered catalog.
    pub async fn scan(&self, scope: Option<&str>) -> Result<Vec<Element>> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        self.ensure_attached(inner).await?;
        let page = inner.page.as_ref().expect("attached above");
        page.transport.send("Runtime.enable", json!({})).await?;
        let catalog = page.scan(scope).await?;
        inner.catalog_len = Some(catalog.len());
        Ok(catalog)
    }

    /// Click a catalog entry by index.
    pub async fn click(&self, index: usize) -> Result<String> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        check_bounds(inner, index)?;
        self.ensure_attached(inner).await?;
        let page = inner.page.as_ref().expect("attached above");
        page.click(index).await
    }

    /// Type into a catalog entry by index (appending; see [`Browser::clear`]).
    pub async fn type_text(&self, index: usize, text: &str) -> Result<String> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        check_bounds(inner, index)?;
        self.ensure_attached(inner).await?;
        let page = inner.page.as_ref().expect("attached above");
        page.type_text(index, text).await
    }

    /// Empty a text-entry catalog element.
    pub async fn clear(&self, index: usize) -> Result<String> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        check_bounds(inner, index)?;
        self.ensure_attached(inner).await?;
        let page = inner.page.as_ref().expect("attached above");
        page.clear(index).await
    }

    /// Attach a file to a file input on the current tab.
    pub async fn upload(&self, path: &Path, selector: Option<&str>) -> Result<String> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        self.ensure_attached(inner).await?;
        let page = inner.page.as_ref().expect("attached above");
        page.upload(path, selector).await
    }

    /// Scroll the current tab.
    pub async fn scroll(&self, direction: &str, amount: i64) -> Result<String> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        self.ensure_attached(inner).await?;
        let page = inner.page.as_ref().expect("attached above");
        page.scroll(direction, amount).await
    }

    // ── Content ──

    /// Visible text of the current tab (bounded).
    pub async fn text(&self, scope: Option<&str>) -> Result<String> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        self.ensure_attached(inner).await?;
        let page = inner.page.as_ref().expect("attached above");
        page.text(scope).await
    }

    /// outerHTML of the first match on the current tab (bounded).
    pub async fn html(&self, selector: &str) -> Result<String> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        self.ensure_attached(inner).await?;
        let page = inner.page.as_ref().expect("attached above");
        page.html(selector).await
    }

    /// Evaluate JavaScript on the current tab.
    pub async fn eval(&self, expression: &str) -> Result<Value> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        self.ensure_attached(inner).await?;
        let page = inner.page.as_ref().expect("attached above");
        page.eval(expression).await
    }

    /// Screenshot the current tab; returns the path written.
    pub async fn screenshot(&self, path: Option<&Path>) -> Result<PathBuf> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        self.ensure_attached(inner).await?;
        let page = inner.page.as_ref().expect("attached above");
        page.screenshot(path).await
    }

    // ── Internals ──

    /// Current-target rule: keep the explicitly attached tab while it is
    /// still open and connected, otherwise fall back to the browser's first
    /// page target.
    async fn ensure_attached(&self, inner: &mut Inner) -> Result<()> {
        let pages = discovery::fetch_pages(&self.endpoint).await?;

        let still_valid = inner
            .page
            .as_ref()
            .is_some_and(|p| p.is_connected() && pages.iter().any(|t| t.id == p.target_id()));
        if !still_valid {
            let target = pages
                .into_iter()
                .next()
                .ok_or_else(|| WebtapError::TargetNotFound("no open tabs".to_string()))?;
            inner.page = Some(self.attach(&target).await?);
            inner.catalog_len = None;
        }
        Ok(())
    }

    async fn attach(&self, target: &TargetInfo) -> Result<Page> {
        let ws_url = target.page_ws_url(&self.endpoint.host, self.endpoint.port);
        let transport = CdpTransport::connect(&ws_url).await?;
        log::debug!("attached to target {} ({})", target.id, target.url);
        Ok(Page::new(target.id.clone(), transport))
    }

    async fn current_target(&self) -> Result<TargetInfo> {
        let pages = discovery::fetch_pages(&self.endpoint).await?;
        let guard = self.inner.lock().await;
        if let Some(page) = guard.page.as_ref() {
            if let Some(t) = pages.iter().find(|t| t.id == page.target_id()) {
                return Ok(t.clone());
            }
        }
        pages
            .into_iter()
            .next()
            .ok_or_else(|| WebtapError::TargetNotFound("no open tabs".to_string()))
    }

    async fn target_by_index(&self, index: usize) -> Result<TargetInfo> {
        let pages = discovery::fetch_pages(&self.endpoint).await?;
        let len = pages.len();
        pages.into_iter().nth(index).ok_or_else(|| {
            WebtapError::TargetNotFound(format!(
                "tab index {index} out of range (0-{})",
                len.saturating_sub(1)
            ))
        })
    }

    /// Transient browser-level connection, used for tab create/close.
    async fn browser_transport(&self) -> Result<CdpTransport> {
        let version = discovery::probe_version(&self.endpoint)
            .await?
            .ok_or_else(|| WebtapError::BrowserUnreachable {
                cdp_url: self.endpoint.http_base(),
                port: self.endpoint.port,
            })?;
        let advertised = version
            .get("webSocketDebuggerUrl")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                WebtapError::Connection("browser did not expose webSocketDebuggerUrl".to_string())
            })?;
        // Same host-pinning as page sockets: keep the advertised path,
        // trust our configured host:port.
        let path = advertised
            .splitn(4, '/')
            .nth(3)
            .map(|p| format!("/{p}"))
            .unwrap_or_default();
        let ws_url = format!("ws://{}:{}{}", self.endpoint.host, self.endpoint.port, path);
        CdpTransport::connect(&ws_url).await
    }
}

fn check_bounds(inner: &Inner, index: usize) -> Result<()> {
    let len = inner.catalog_len.unwrap_or(0);
    if index >= len {
        return Err(WebtapError::IndexOutOfRange { index, len });
    }
    Ok(())
}

/// Add a scheme when the caller passed a bare hostname or path.
fn normalize_url(url: &str) -> String {
    const PASSTHROUGH: [&str; 6] = [
        "http://", "https://", "file://", "about:", "data:", "chrome://",
    ];
    if PASSTHROUGH.iter().any(|p| url.starts_with(p)) {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_adds_https() {
        assert_eq!(normalize_url("github.com"), "https://github.com");
    }

    #[test]
    fn normalize_keeps_explicit_schemes() {
        for url in [
            "http://example.com",
            "https://example.com",
            "file:///tmp/x.html",
            "about:blank",
            "data:text/html,<p>hi</p>",
            "chrome://version",
        ] {
            assert_eq!(normalize_url(url), url);
        }
    }

    #[test]
    fn bounds_check_before_any_scan() {
        let inner = Inner::default();
        let err = check_bounds(&inner, 0).unwrap_err();
        assert!(matches!(
            err,
            WebtapError::IndexOutOfRange { index: 0, len: 0 }
        ));
    }

    #[test]
    fn bounds_check_after_scan() {
        let inner = Inner {
            page: None,
            catalog_len: Some(3),
        };
        assert!(check_bounds(&inner, 2).is_ok());
        assert!(check_bounds(&inner, 3).is_err());
    }

    #[test]
    fn tab_display_handles_untitled() {
        let tab = Tab {
            index: 2,
            id: "T".into(),
            title: String::new(),
            url: "https://example.com".into(),
        };
        assert_eq!(tab.to_string(), "[2] (untitled) — https://example.com");
    }
}
