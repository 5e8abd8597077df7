//! One-shot CDP round-trips over a target's debug WebSocket.
//!
//! Used for the primitives served straight from the inspection protocol
//! (screenshots, PDF, DOM snapshots, cookies, raw evaluate, resize) without
//! going through the automation layer.

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{DriverError, Result};

/// Send a single CDP command and wait for its response
pub async fn send(
    ws_url: &str,
    method: &str,
    params: serde_json::Value,
) -> Result<serde_json::Value> {
    let (mut ws, _) = connect_async(ws_url)
        .await
        .map_err(|e| DriverError::ControlEndpoint(format!("WebSocket connection failed: {}", e)))?;

    let cmd = serde_json::json!({
        "id": 1,
        "method": method,
        "params": params
    });

    ws.send(Message::Text(cmd.to_string().into()))
        .await
        .map_err(|e| DriverError::Other(format!("Failed to send {}: {}", method, e)))?;

    while let Some(msg) = ws.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let response: serde_json::Value = serde_json::from_str(text.as_str())?;
                if response.get("id") == Some(&serde_json::json!(1)) {
                    if let Some(error) = response.get("error") {
                        return Err(DriverError::Other(format!(
                            "{} failed: {}",
                            method, error
                        )));
                    }
                    return Ok(response
                        .get("result")
                        .cloned()
                        .unwrap_or(serde_json::Value::Null));
                }
            }
            Ok(_) => continue,
            Err(e) => return Err(DriverError::Other(format!("WebSocket error: {}", e))),
        }
    }

    Err(DriverError::Other(format!(
        "No response received for {}",
        method
    )))
}

/// Evaluate a JavaScript expression over the debug WebSocket and return its
/// JSON value. Page-side exceptions surface as errors.
pub async fn evaluate(ws_url: &str, expression: &str) -> Result<serde_json::Value> {
    let result = send(
        ws_url,
        "Runtime.evaluate",
        serde_json::json!({
            "expression": expression,
            "returnByValue": true,
            "awaitPromise": true,
        }),
    )
    .await?;

    if let Some(exception) = result.get("exceptionDetails") {
        let message = exception
            .get("exception")
            .and_then(|e| e.get("description"))
            .or_else(|| exception.get("text"))
            .and_then(|v| v.as_str())
            .unwrap_or("JavaScript exception");
        return Err(DriverError::Other(message.to_string()));
    }

    Ok(result
        .get("result")
        .and_then(|r| r.get("value"))
        .cloned()
        .unwrap_or(serde_json::Value::Null))
}
