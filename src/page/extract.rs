//! Content extractors, each bounded in output size to keep token cost flat.

use std::path::{Path, PathBuf};

use base64::Engine;
use serde_json::Value;

use super::{js, Page};
use crate::error::{Result, WebtapError};

impl Page {
    /// Visible text under the page (or a scoped container), truncated at
    /// the text budget with an explicit `... (truncated)` marker.
    pub async fn text(&self, scope: Option<&str>) -> Result<String> {
        let value = self.eval(&js::extract_text_js(scope)).await?;
        Ok(value
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| "(empty page)".to_string()))
    }

    /// outerHTML of the first element matching `selector`, truncated at the
    /// markup budget.
    pub async fn html(&self, selector: &str) -> Result<String> {
        let value = self.eval(&js::get_html_js(selector)).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Capture the current viewport as PNG and write it to `path`, or to a
    /// timestamped file in the system temp directory. Returns the path
    /// written.
    pub async fn screenshot(&self, path: Option<&Path>) -> Result<PathBuf> {
        let result = self
            .transport
            .send("Page.captureScreenshot", serde_json::json!({ "format": "png" }))
            .await?;
        let data = result
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| WebtapError::Cdp {
                method: "Page.captureScreenshot".into(),
                message: "no image data in reply".into(),
            })?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| WebtapError::Cdp {
                method: "Page.captureScreenshot".into(),
                message: format!("bad base64 image data: {e}"),
            })?;

        let out = match path {
            Some(p) => p.to_path_buf(),
            None => std::env::temp_dir().join(format!(
                "webtap_screenshot_{}.png",
                chrono::Utc::now().format("%Y%m%dT%H%M%S")
            )),
        };
        tokio::fs::write(&out, bytes).await?;
        log::debug!("screenshot written to {}", out.display());
        Ok(out)
    }
}
