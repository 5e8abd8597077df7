//! Per-target capture buffers for console and network events.
//!
//! Capture is armed once per target and appends from background listener
//! tasks as events arrive, so a buffer read immediately after a triggering
//! action may not reflect it yet; callers allow a settle delay. Buffers are
//! bounded; the oldest entries are dropped first.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chromiumoxide::cdp::browser_protocol::network;
use chromiumoxide::cdp::js_protocol::runtime;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::DriverSession;
use crate::error::Result;

/// Cap per buffer; long-lived tabs drop their oldest entries
const MAX_BUFFERED_ENTRIES: usize = 2000;

#[derive(Debug, Clone, Serialize)]
pub struct ConsoleEntry {
    pub level: String,
    pub text: String,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkPhase {
    Request,
    Response,
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkEntry {
    pub phase: NetworkPhase,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<i64>,
    pub timestamp_ms: i64,
}

/// Append-only log that evicts from the front once full
#[derive(Debug)]
pub(crate) struct BoundedLog<T> {
    entries: Vec<T>,
    capacity: usize,
}

impl<T> BoundedLog<T> {
    fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
        }
    }

    fn push(&mut self, entry: T) {
        if self.entries.len() >= self.capacity {
            self.entries.remove(0);
        }
        self.entries.push(entry);
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn entries(&self) -> &[T] {
        &self.entries
    }
}

impl<T> Default for BoundedLog<T> {
    fn default() -> Self {
        Self::new(MAX_BUFFERED_ENTRIES)
    }
}

struct Capture<T> {
    buffer: Arc<Mutex<BoundedLog<T>>>,
    tasks: Vec<JoinHandle<()>>,
}

impl<T> Default for Capture<T> {
    fn default() -> Self {
        Self {
            buffer: Arc::new(Mutex::new(BoundedLog::default())),
            tasks: Vec::new(),
        }
    }
}

impl<T> Capture<T> {
    /// Armed while at least one listener task is still draining its stream.
    /// Tasks end when the underlying handle closes, which re-opens arming.
    fn is_armed(&self) -> bool {
        self.tasks.iter().any(|t| !t.is_finished())
    }

    fn abort(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

/// Owns every per-target capture, keyed by target id
#[derive(Default)]
pub(crate) struct CaptureHub {
    console: Mutex<HashMap<String, Capture<ConsoleEntry>>>,
    network: Mutex<HashMap<String, Capture<NetworkEntry>>>,
}

impl CaptureHub {
    /// Drop buffers and stop listeners for a closed target
    pub(crate) async fn forget(&self, target_id: &str) {
        if let Some(mut capture) = self.console.lock().await.remove(target_id) {
            capture.abort();
        }
        if let Some(mut capture) = self.network.lock().await.remove(target_id) {
            capture.abort();
        }
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn console_level(kind: &runtime::ConsoleApiCalledType) -> String {
    format!("{:?}", kind).to_lowercase()
}

/// Render console arguments the way devtools would: primitive values
/// verbatim, everything else by description.
fn console_text(args: &[runtime::RemoteObject]) -> String {
    args.iter()
        .map(|arg| {
            if let Some(value) = &arg.value {
                match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                }
            } else {
                arg.description.clone().unwrap_or_default()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn level_matches(entry: &ConsoleEntry, level: &str) -> bool {
    entry.level.eq_ignore_ascii_case(level)
}

impl DriverSession {
    /// Arm console capture for a target. No-op while a live listener is
    /// already attached to the target's handle.
    pub async fn start_console_capture(&self, target_id: &str) -> Result<()> {
        let page = self.resolve(target_id).await?;

        let mut captures = self.captures.console.lock().await;
        let capture = captures.entry(target_id.to_string()).or_default();
        if capture.is_armed() {
            return Ok(());
        }

        page.execute(runtime::EnableParams::default()).await?;
        let mut stream = page
            .event_listener::<runtime::EventConsoleApiCalled>()
            .await?;

        let buffer = capture.buffer.clone();
        capture.tasks.push(tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                let entry = ConsoleEntry {
                    level: console_level(&event.r#type),
                    text: console_text(&event.args),
                    timestamp_ms: now_ms(),
                };
                buffer.lock().await.push(entry);
            }
        }));

        tracing::debug!("Console capture armed for target {}", target_id);
        Ok(())
    }

    /// Buffered console entries, optionally filtered by level
    pub async fn console_logs(&self, target_id: &str, level: Option<&str>) -> Vec<ConsoleEntry> {
        let captures = self.captures.console.lock().await;
        let Some(capture) = captures.get(target_id) else {
            return Vec::new();
        };

        let buffer = capture.buffer.lock().await;
        match level {
            Some(level) => buffer
                .entries()
                .iter()
                .filter(|e| level_matches(e, level))
                .cloned()
                .collect(),
            None => buffer.entries().to_vec(),
        }
    }

    /// Empty the console buffer; listeners stay armed
    pub async fn clear_console_logs(&self, target_id: &str) {
        let captures = self.captures.console.lock().await;
        if let Some(capture) = captures.get(target_id) {
            capture.buffer.lock().await.clear();
        }
    }

    /// Arm network capture (request + response events) for a target
    pub async fn start_network_capture(&self, target_id: &str) -> Result<()> {
        let page = self.resolve(target_id).await?;

        let mut captures = self.captures.network.lock().await;
        let capture = captures.entry(target_id.to_string()).or_default();
        if capture.is_armed() {
            return Ok(());
        }

        page.execute(network::EnableParams::default()).await?;

        let mut requests = page
            .event_listener::<network::EventRequestWillBeSent>()
            .await?;
        let buffer = capture.buffer.clone();
        capture.tasks.push(tokio::spawn(async move {
            while let Some(event) = requests.next().await {
                let entry = NetworkEntry {
                    phase: NetworkPhase::Request,
                    url: event.request.url.clone(),
                    method: Some(event.request.method.clone()),
                    status: None,
                    timestamp_ms: now_ms(),
                };
                buffer.lock().await.push(entry);
            }
        }));

        let mut responses = page
            .event_listener::<network::EventResponseReceived>()
            .await?;
        let buffer = capture.buffer.clone();
        capture.tasks.push(tokio::spawn(async move {
            while let Some(event) = responses.next().await {
                let entry = NetworkEntry {
                    phase: NetworkPhase::Response,
                    url: event.response.url.clone(),
                    method: None,
                    status: Some(event.response.status),
                    timestamp_ms: now_ms(),
                };
                buffer.lock().await.push(entry);
            }
        }));

        tracing::debug!("Network capture armed for target {}", target_id);
        Ok(())
    }

    /// Buffered network entries, optionally filtered by URL substring
    pub async fn network_logs(&self, target_id: &str, filter: Option<&str>) -> Vec<NetworkEntry> {
        let captures = self.captures.network.lock().await;
        let Some(capture) = captures.get(target_id) else {
            return Vec::new();
        };

        let buffer = capture.buffer.lock().await;
        match filter {
            Some(substring) => buffer
                .entries()
                .iter()
                .filter(|e| e.url.contains(substring))
                .cloned()
                .collect(),
            None => buffer.entries().to_vec(),
        }
    }

    /// Empty the network buffer; listeners stay armed
    pub async fn clear_network_logs(&self, target_id: &str) {
        let captures = self.captures.network.lock().await;
        if let Some(capture) = captures.get(target_id) {
            capture.buffer.lock().await.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(level: &str, text: &str) -> ConsoleEntry {
        ConsoleEntry {
            level: level.to_string(),
            text: text.to_string(),
            timestamp_ms: 0,
        }
    }

    #[test]
    fn bounded_log_drops_oldest_beyond_capacity() {
        let mut log = BoundedLog::new(3);
        for i in 0..5 {
            log.push(i);
        }
        assert_eq!(log.entries(), &[2, 3, 4]);
    }

    #[test]
    fn bounded_log_clear_empties_without_shrinking_capacity() {
        let mut log = BoundedLog::new(2);
        log.push("a");
        log.push("b");
        log.clear();
        assert!(log.entries().is_empty());

        log.push("c");
        log.push("d");
        log.push("e");
        assert_eq!(log.entries(), &["d", "e"]);
    }

    #[test]
    fn level_filter_is_case_insensitive() {
        let warning = entry("Warning", "low disk space");
        assert!(level_matches(&warning, "warning"));
        assert!(level_matches(&warning, "WARNING"));
        assert!(!level_matches(&warning, "error"));
    }

    #[test]
    fn three_distinct_levels_filter_to_matching_subset() {
        let mut log = BoundedLog::default();
        log.push(entry("log", "one"));
        log.push(entry("warning", "two"));
        log.push(entry("error", "three"));

        assert_eq!(log.entries().len(), 3);
        let errors: Vec<_> = log
            .entries()
            .iter()
            .filter(|e| level_matches(e, "error"))
            .collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].text, "three");
    }

    #[test]
    fn network_entries_serialize_with_lowercase_phase() {
        let request = NetworkEntry {
            phase: NetworkPhase::Request,
            url: "https://api.example/items".to_string(),
            method: Some("GET".to_string()),
            status: None,
            timestamp_ms: 1,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["phase"], "request");
        assert_eq!(json["method"], "GET");
        assert!(json.get("status").is_none());
    }
}
