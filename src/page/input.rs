//! The interaction dispatcher: numbered index in, protocol-level input out.
//!
//! Clicks are real mouse press/release sequences via `Input.dispatchMouseEvent`
//! and typing goes through `Input.insertText` plus a native-setter sync, so
//! framework-managed components (React/Vue/Angular) observe the interaction
//! exactly as if a user performed it. Script-level `.click()` is never used.

use std::path::Path;
use std::time::Duration;

use serde_json::{json, Value};

use super::{js, Page};
use crate::error::{Result, WebtapError};

/// Classify a resolution payload from [`js::click_info_js`]-style scripts.
/// `stale` means the stamp is gone; `reason` means present but unusable.
fn resolution_error(index: usize, payload: &Value) -> Option<WebtapError> {
    if payload.get("stale").and_then(Value::as_bool) == Some(true) {
        return Some(WebtapError::StaleIndex(index));
    }
    if let Some(reason) = payload.get("reason").and_then(Value::as_str) {
        return Some(WebtapError::ElementNotInteractable {
            index,
            reason: reason.to_string(),
        });
    }
    None
}

impl Page {
    /// Click the element stamped with `index`.
    ///
    /// Re-resolves the stamp, scrolls the node into view, verifies it is
    /// hittable, then dispatches mousePressed + mouseReleased at its center.
    /// Returns a description of what was clicked.
    pub async fn click(&self, index: usize) -> Result<String> {
        let info = self.eval_json(&js::click_info_js(index)).await?;
        if let Some(err) = resolution_error(index, &info) {
            return Err(err);
        }

        let (x, y) = point_of(&info);
        self.dispatch_click(x, y).await?;

        let kind = info.get("kind").and_then(Value::as_str).unwrap_or("element");
        let desc = info.get("desc").and_then(Value::as_str).unwrap_or("");
        log::debug!("clicked [{index}] ({kind}) at ({x:.0},{y:.0})");
        Ok(format!("Clicked: ({kind}) {desc}"))
    }

    /// Type text into the element stamped with `index`.
    ///
    /// Appends at the caret — callers that want replacement call
    /// [`Page::clear`] first. The element is focused with a real click, the
    /// text inserted with `Input.insertText` (per-character key events as a
    /// fallback), and for plain inputs the value is re-asserted through the
    /// native setter with input/change events so controlled components
    /// update their state.
    pub async fn type_text(&self, index: usize, text: &str) -> Result<String> {
        let info = self.eval_json(&js::type_info_js(index)).await?;
        if let Some(err) = resolution_error(index, &info) {
            return Err(err);
        }

        let (x, y) = point_of(&info);
        let contenteditable = info.get("ce").and_then(Value::as_bool).unwrap_or(false);
        let tag = info.get("tag").and_then(Value::as_str).unwrap_or("element");

        // Focus with real mouse events, then give the page a beat to move
        // focus before inserting.
        self.dispatch_click(x, y).await?;
        tokio::time::sleep(Duration::from_millis(100)).await;

        if let Err(e) = self
            .transport
            .send("Input.insertText", json!({ "text": text }))
            .await
        {
            log::debug!("Input.insertText failed ({e}), falling back to key events");
            self.type_by_key_events(text).await?;
        }

        if !contenteditable {
            self.eval_json(&js::sync_value_js(index)).await?;
        }

        let ce = if contenteditable { ", contenteditable" } else { "" };
        Ok(format!("Typed into [{index}] ({tag}{ce})"))
    }

    /// Empty the element stamped with `index` — the explicit replacement
    /// path that complements append-by-default typing.
    pub async fn clear(&self, index: usize) -> Result<String> {
        let info = self.eval_json(&js::clear_js(index)).await?;
        if let Some(err) = resolution_error(index, &info) {
            return Err(err);
        }

        // contenteditable: the script selected everything, a Backspace
        // deletes the selection through the normal editing pipeline.
        if info.get("ce").and_then(Value::as_bool) == Some(true) {
            self.key_press("Backspace").await?;
        }
        Ok(format!("Cleared [{index}]"))
    }

    /// Attach a local file to a file input, bypassing the OS picker.
    ///
    /// `selector` defaults to the first `input[type="file"]`; hidden file
    /// inputs work too since no rendering is involved.
    pub async fn upload(&self, path: &Path, selector: Option<&str>) -> Result<String> {
        let abs = path.canonicalize()?;
        let selector = selector.unwrap_or("input[type=\"file\"]");

        self.transport.send("DOM.enable", json!({})).await?;
        let doc = self.transport.send("DOM.getDocument", json!({})).await?;
        let root_id = doc
            .pointer("/root/nodeId")
            .and_then(Value::as_u64)
            .ok_or_else(|| WebtapError::Cdp {
                method: "DOM.getDocument".into(),
                message: "no document root".into(),
            })?;

        let node = self
            .transport
            .send(
                "DOM.querySelector",
                json!({ "nodeId": root_id, "selector": selector }),
            )
            .await?;
        let node_id = node.get("nodeId").and_then(Value::as_u64).unwrap_or(0);
        if node_id == 0 {
            return Err(WebtapError::ElementNotFound(format!(
                "no file input matching: {selector}"
            )));
        }

        self.transport
            .send(
                "DOM.setFileInputFiles",
                json!({ "files": [abs.to_string_lossy()], "nodeId": node_id }),
            )
            .await?;

        let name = abs
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(format!("Uploaded: {name} -> {selector}"))
    }

    /// Scroll the page: up/down by `amount` pixels, or to top/bottom.
    pub async fn scroll(&self, direction: &str, amount: i64) -> Result<String> {
        let expr = js::scroll_js(direction, amount).ok_or_else(|| {
            WebtapError::Evaluation(format!(
                "invalid scroll direction '{direction}' (use: up, down, top, bottom)"
            ))
        })?;
        self.eval(&expr).await?;
        let suffix = if matches!(direction, "up" | "down") {
            format!(" {amount}px")
        } else {
            String::new()
        };
        Ok(format!("Scrolled {direction}{suffix}"))
    }

    async fn dispatch_click(&self, x: f64, y: f64) -> Result<()> {
        for event in ["mousePressed", "mouseReleased"] {
            self.transport
                .send(
                    "Input.dispatchMouseEvent",
                    json!({
                        "type": event,
                        "x": x,
                        "y": y,
                        "button": "left",
                        "clickCount": 1,
                    }),
                )
                .await?;
        }
        Ok(())
    }

    async fn type_by_key_events(&self, text: &str) -> Result<()> {
        for ch in text.chars() {
            let s = ch.to_string();
            self.transport
                .send(
                    "Input.dispatchKeyEvent",
                    json!({ "type": "keyDown", "text": s, "key": s, "unmodifiedText": s }),
                )
                .await?;
            self.transport
                .send(
                    "Input.dispatchKeyEvent",
                    json!({ "type": "keyUp", "key": s }),
                )
                .await?;
        }
        Ok(())
    }

    async fn key_press(&self, key: &str) -> Result<()> {
        for event in ["keyDown", "keyUp"] {
            self.transport
                .send(
                    "Input.dispatchKeyEvent",
                    json!({ "type": event, "key": key, "code": key }),
                )
                .await?;
        }
        Ok(())
    }
}

fn point_of(info: &Value) -> (f64, f64) {
    (
        info.get("x").and_then(Value::as_f64).unwrap_or(0.0),
        info.get("y").and_then(Value::as_f64).unwrap_or(0.0),
    )
}
