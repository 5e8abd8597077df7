//! The per-session driver core: target registry, page-handle resolution,
//! action dispatch, event capture, and upload/download coordination.
//!
//! A [`DriverSession`] speaks two protocols against one browser: the CDP
//! HTTP control endpoint (and per-target debug WebSockets) for tab lifecycle
//! and raw protocol access, and a chromiumoxide connection for high-level
//! page automation. The two surfaces share no identifiers; the resolver
//! correlates them heuristically.

mod action;
mod capture;
pub mod cdp;
mod inspect;
mod resolver;
mod target;
mod transfer;

pub use action::{Action, FieldValue};
pub use capture::{ConsoleEntry, NetworkEntry, NetworkPhase};
pub use inspect::{ImageFormat, ScreenshotOptions, Snapshot, SnapshotFormat};
pub use target::Target;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use chromiumoxide::browser::Browser;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::error::{DriverError, Result};
use capture::CaptureHub;
use transfer::TransferHub;

/// Connection parameters for a driver session
#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub cdp_port: u16,
    /// Browser-level WebSocket URL; fetched from /json/version when absent
    pub browser_ws_url: Option<String>,
    /// Settle delay before page-handle resolution
    pub settle_delay: Duration,
    /// Directory downloads are routed into
    pub download_dir: PathBuf,
}

/// The resolved association between a target and an automation-layer handle
#[derive(Clone)]
pub(crate) struct PageBinding {
    pub page: Page,
    #[allow(dead_code)]
    pub bound_at: SystemTime,
}

/// Registry + binding state, guarded as one unit so binding eviction is
/// atomic with respect to target removal.
#[derive(Default)]
pub(crate) struct DriverState {
    pub targets: HashMap<String, Target>,
    pub bindings: HashMap<String, PageBinding>,
}

/// High-level automation connection; absent when chromiumoxide could not
/// attach, in which case interactive actions are unavailable but the
/// control endpoint keeps working.
struct Automation {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

/// One live browser session driven over both control surfaces
pub struct DriverSession {
    cdp_port: u16,
    http: reqwest::Client,
    settle_delay: Duration,
    download_dir: PathBuf,
    browser_ws_url: String,
    automation: Option<Automation>,
    state: Mutex<DriverState>,
    captures: CaptureHub,
    transfers: TransferHub,
}

impl DriverSession {
    /// Attach to a running browser. The control endpoint must answer
    /// (`SessionNotRunning` otherwise); a failed automation-layer connection
    /// only degrades the session.
    pub async fn connect(opts: DriverOptions) -> Result<Self> {
        let http = reqwest::Client::builder()
            .no_proxy()
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let version_url = format!("http://127.0.0.1:{}/json/version", opts.cdp_port);
        let response = http
            .get(&version_url)
            .send()
            .await
            .map_err(|_| DriverError::SessionNotRunning)?;
        if !response.status().is_success() {
            return Err(DriverError::SessionNotRunning);
        }

        let ws_url = match opts.browser_ws_url {
            Some(url) => url,
            None => {
                let info: serde_json::Value = response
                    .json()
                    .await
                    .map_err(|e| DriverError::ControlEndpoint(e.to_string()))?;
                info.get("webSocketDebuggerUrl")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
                    .ok_or_else(|| {
                        DriverError::ControlEndpoint(
                            "No WebSocket URL in /json/version response".to_string(),
                        )
                    })?
            }
        };

        let automation = match Browser::connect(&ws_url).await {
            Ok((browser, mut handler)) => {
                let handler_task =
                    tokio::spawn(async move { while handler.next().await.is_some() {} });
                Some(Automation {
                    browser,
                    handler_task,
                })
            }
            Err(e) => {
                tracing::warn!(
                    "Automation layer connection failed: {} - interactive actions unavailable",
                    e
                );
                None
            }
        };

        Ok(Self {
            cdp_port: opts.cdp_port,
            http,
            settle_delay: opts.settle_delay,
            download_dir: opts.download_dir,
            browser_ws_url: ws_url,
            automation,
            state: Mutex::new(DriverState::default()),
            captures: CaptureHub::default(),
            transfers: TransferHub::default(),
        })
    }

    pub fn cdp_port(&self) -> u16 {
        self.cdp_port
    }

    pub fn download_dir(&self) -> &PathBuf {
        &self.download_dir
    }

    pub(crate) fn browser_ws_url(&self) -> &str {
        &self.browser_ws_url
    }

    /// Whether the high-level automation layer is attached
    pub fn automation_attached(&self) -> bool {
        self.automation.is_some()
    }

    pub(crate) fn automation_browser(&self) -> Result<&Browser> {
        self.automation
            .as_ref()
            .map(|a| &a.browser)
            .ok_or_else(|| DriverError::Other("Automation layer not attached".to_string()))
    }

    /// Session summary for status output
    pub async fn status(&self) -> DriverStatus {
        let state = self.state.lock().await;
        DriverStatus {
            cdp_port: self.cdp_port,
            automation_attached: self.automation.is_some(),
            tab_count: state.targets.len(),
        }
    }

    /// Close the browser itself (used by session teardown)
    pub async fn shutdown_browser(mut self) {
        if let Some(mut automation) = self.automation.take() {
            if let Err(e) = automation.browser.close().await {
                tracing::warn!("Error closing browser: {}", e);
            }
            automation.handler_task.abort();
        }
    }

    /// Drop the binding and both log buffers for a target. Callers hold the
    /// state lock for the binding half; buffer cleanup follows immediately so
    /// no lookup can observe a binding for a closed target.
    pub(crate) async fn forget_target(&self, state: &mut DriverState, target_id: &str) {
        state.targets.remove(target_id);
        state.bindings.remove(target_id);
        self.captures.forget(target_id).await;
        self.transfers.forget(target_id).await;
    }
}

#[derive(Debug, Clone)]
pub struct DriverStatus {
    pub cdp_port: u16,
    pub automation_attached: bool,
    pub tab_count: usize,
}
