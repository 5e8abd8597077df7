//! Operations served straight from the inspection protocol: navigation
//! fallback, screenshots, PDF export, page snapshots, cookies, and raw
//! evaluation.

use base64::Engine;
use serde::Serialize;
use serde_json::Value;

use super::{cdp, DriverSession};
use crate::error::{DriverError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScreenshotOptions {
    pub format: ImageFormat,
    /// JPEG quality (0-100); ignored for PNG
    pub quality: Option<i64>,
    pub full_page: bool,
}

impl Default for ScreenshotOptions {
    fn default() -> Self {
        Self {
            format: ImageFormat::Png,
            quality: None,
            full_page: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    Html,
    Aria,
}

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub format: String,
    pub content: String,
    pub url: String,
}

fn decode_payload(result: &Value, what: &str) -> Result<Vec<u8>> {
    let data = result
        .get("data")
        .and_then(|v| v.as_str())
        .ok_or_else(|| DriverError::Other(format!("No {} data in response", what)))?;

    base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| DriverError::Other(format!("Failed to decode {}: {}", what, e)))
}

impl DriverSession {
    /// Navigate a target. Prefers the automation handle; falls back to a
    /// raw Page.navigate plus a settle delay when the handle layer is
    /// unavailable.
    pub async fn navigate(&self, target_id: &str, url: &str) -> Result<()> {
        if self.automation_attached() {
            let page = self.resolve(target_id).await?;
            page.goto(url)
                .await
                .map_err(|e| DriverError::for_action("navigate", target_id, e))?;
            if let Err(e) = page.wait_for_navigation().await {
                tracing::debug!("Navigation wait ended early: {}", e);
            }
        } else {
            let ws_url = self.target_ws_url(target_id).await?;
            cdp::send(&ws_url, "Page.navigate", serde_json::json!({ "url": url }))
                .await
                .map_err(|e| DriverError::for_action("navigate", target_id, e))?;
            tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        }

        // Keep the registry's last-known URL fresh for the resolver
        let mut state = self.state.lock().await;
        if let Some(target) = state.targets.get_mut(target_id) {
            target.url = url.to_string();
        }

        Ok(())
    }

    /// Capture a screenshot of the target as raw image bytes
    pub async fn screenshot(
        &self,
        target_id: &str,
        options: &ScreenshotOptions,
    ) -> Result<Vec<u8>> {
        let ws_url = self.target_ws_url(target_id).await?;

        let mut params = serde_json::json!({ "format": options.format.as_str() });
        if options.format == ImageFormat::Jpeg {
            params["quality"] = serde_json::json!(options.quality.unwrap_or(90));
        }

        if options.full_page {
            let metrics = cdp::send(&ws_url, "Page.getLayoutMetrics", serde_json::json!({}))
                .await
                .map_err(|e| DriverError::for_action("screenshot", target_id, e))?;

            let content_size = metrics
                .get("contentSize")
                .ok_or_else(|| DriverError::Other("No content size in layout metrics".into()))?;
            let width = content_size
                .get("width")
                .and_then(|v| v.as_f64())
                .unwrap_or(1920.0);
            let height = content_size
                .get("height")
                .and_then(|v| v.as_f64())
                .unwrap_or(1080.0);

            params["clip"] = serde_json::json!({
                "x": 0, "y": 0, "width": width, "height": height, "scale": 1
            });
            params["captureBeyondViewport"] = serde_json::json!(true);
        }

        let result = cdp::send(&ws_url, "Page.captureScreenshot", params)
            .await
            .map_err(|e| DriverError::for_action("screenshot", target_id, e))?;

        decode_payload(&result, "screenshot")
    }

    /// Export the target as PDF
    pub async fn pdf(&self, target_id: &str) -> Result<Vec<u8>> {
        let ws_url = self.target_ws_url(target_id).await?;
        let result = cdp::send(&ws_url, "Page.printToPDF", serde_json::json!({}))
            .await
            .map_err(|e| DriverError::for_action("pdf", target_id, e))?;
        decode_payload(&result, "PDF")
    }

    /// Structured page snapshot: accessibility outline when the automation
    /// layer is attached, raw HTML otherwise (and as the aria fallback).
    pub async fn snapshot(&self, target_id: &str, format: SnapshotFormat) -> Result<Snapshot> {
        if format == SnapshotFormat::Aria {
            match self.aria_snapshot(target_id).await {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) => tracing::warn!("Aria snapshot failed, falling back to HTML: {}", e),
            }
        }

        self.html_snapshot(target_id).await
    }

    async fn aria_snapshot(&self, target_id: &str) -> Result<Snapshot> {
        let page = self.resolve(target_id).await?;

        let js = r#"
            JSON.stringify(
                Array.from(document.querySelectorAll(
                    'a, button, input, select, textarea, [role], h1, h2, h3'
                ))
                .slice(0, 200)
                .map((el, i) => ({
                    ref: 'e' + (i + 1),
                    tag: el.tagName.toLowerCase(),
                    role: el.getAttribute('role') || el.tagName.toLowerCase(),
                    name: (el.textContent || '').trim().slice(0, 80)
                        || el.getAttribute('aria-label')
                        || el.getAttribute('placeholder')
                        || '',
                })),
                null, 2
            )
        "#;

        let content = page
            .evaluate(js)
            .await
            .map_err(|e| DriverError::Eval {
                target: target_id.to_string(),
                message: e.to_string(),
            })?
            .value()
            .and_then(|v| v.as_str().map(|s| s.to_string()))
            .unwrap_or_else(|| "[]".to_string());

        let url = page
            .url()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| "unknown".to_string());

        Ok(Snapshot {
            format: "aria".to_string(),
            content,
            url,
        })
    }

    async fn html_snapshot(&self, target_id: &str) -> Result<Snapshot> {
        let ws_url = self.target_ws_url(target_id).await?;

        let document = cdp::send(
            &ws_url,
            "DOM.getDocument",
            serde_json::json!({ "depth": -1 }),
        )
        .await
        .map_err(|e| DriverError::for_action("snapshot", target_id, e))?;

        let node_id = document
            .get("root")
            .and_then(|r| r.get("nodeId"))
            .cloned()
            .ok_or_else(|| DriverError::Other("No document root in DOM response".into()))?;

        let outer = cdp::send(
            &ws_url,
            "DOM.getOuterHTML",
            serde_json::json!({ "nodeId": node_id }),
        )
        .await
        .map_err(|e| DriverError::for_action("snapshot", target_id, e))?;

        let content = outer
            .get("outerHTML")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let url = self
            .target_url(target_id)
            .await
            .unwrap_or_else(|| "unknown".to_string());

        Ok(Snapshot {
            format: "html".to_string(),
            content,
            url,
        })
    }

    /// All cookies visible to the target
    pub async fn cookies(&self, target_id: &str) -> Result<Vec<Value>> {
        let ws_url = self.target_ws_url(target_id).await?;
        let result = cdp::send(&ws_url, "Network.getCookies", serde_json::json!({}))
            .await
            .map_err(|e| DriverError::for_action("cookies", target_id, e))?;

        Ok(result
            .get("cookies")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default())
    }

    /// Set a cookie from a standard name/value/domain/path/expiry object
    pub async fn set_cookie(&self, target_id: &str, cookie: Value) -> Result<()> {
        let ws_url = self.target_ws_url(target_id).await?;
        cdp::send(&ws_url, "Network.setCookie", cookie)
            .await
            .map_err(|e| DriverError::for_action("cookies", target_id, e))?;
        Ok(())
    }

    /// Evaluate an expression over the raw protocol, bypassing the
    /// automation layer entirely.
    pub async fn evaluate_raw(&self, target_id: &str, expression: &str) -> Result<Value> {
        let ws_url = self.target_ws_url(target_id).await?;
        cdp::evaluate(&ws_url, expression)
            .await
            .map_err(|e| match e {
                DriverError::ControlEndpoint(_) => e,
                other => DriverError::Eval {
                    target: target_id.to_string(),
                    message: other.to_string(),
                },
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_payload_rejects_missing_data() {
        let result = serde_json::json!({ "unexpected": true });
        assert!(decode_payload(&result, "screenshot").is_err());
    }

    #[test]
    fn decode_payload_decodes_base64() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"fake-png");
        let result = serde_json::json!({ "data": encoded });
        assert_eq!(decode_payload(&result, "screenshot").unwrap(), b"fake-png");
    }

    #[test]
    fn screenshot_defaults_are_viewport_png() {
        let options = ScreenshotOptions::default();
        assert_eq!(options.format, ImageFormat::Png);
        assert!(!options.full_page);
        assert!(options.quality.is_none());
    }
}
