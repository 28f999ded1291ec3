//! One attached page target: eval plumbing plus the scanner, dispatcher and
//! extractor operations built on it.

pub mod extract;
pub mod input;
pub mod js;
pub mod scan;

use serde_json::Value;

use crate::cdp::CdpTransport;
use crate::error::{Result, WebtapError};

/// A CDP session attached to a single page target.
///
/// Holds the persistent transport for that target. Never holds DOM node
/// references — everything element-level is re-resolved per call through
/// the index stamps (see [`js`]).
pub struct Page {
    pub(crate) target_id: String,
    pub(crate) transport: CdpTransport,
}

impl Page {
    pub(crate) fn new(target_id: String, transport: CdpTransport) -> Self {
        Self {
            target_id,
            transport,
        }
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Evaluate a JavaScript expression and return its value.
    ///
    /// Promises are awaited; a page-side exception surfaces as
    /// [`WebtapError::Evaluation`] with the page's own message.
    pub async fn eval(&self, expression: &str) -> Result<Value> {
        let result = self
            .transport
            .send(
                "Runtime.evaluate",
                serde_json::json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;

        if let Some(exc) = result.get("exceptionDetails") {
            let desc = exc
                .get("exception")
                .and_then(|e| e.get("description"))
                .and_then(Value::as_str)
                .or_else(|| exc.get("text").and_then(Value::as_str))
                .unwrap_or("unknown page exception");
            return Err(WebtapError::Evaluation(desc.to_string()));
        }

        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Evaluate an expression whose script returns `JSON.stringify(...)`,
    /// and parse the payload. The injected expressions in [`js`] all use
    /// this convention so values survive the protocol boundary unchanged.
    pub(crate) async fn eval_json(&self, expression: &str) -> Result<Value> {
        let value = self.eval(expression).await?;
        match value {
            Value::String(s) => serde_json::from_str(&s)
                .map_err(|e| WebtapError::Evaluation(format!("bad script payload: {e}"))),
            other => Ok(other),
        }
    }
}
