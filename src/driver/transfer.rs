//! One-shot file-chooser arming and download waiting.
//!
//! Uploads intercept the page's next file-chooser dialog and answer it with
//! caller-supplied paths, exactly once. Downloads are routed into the
//! session's download directory; completion is detected by watching for a
//! new, fully-written file rather than protocol events, which are
//! browser-target scoped and version-sensitive.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::page::{
    EventFileChooserOpened, SetInterceptFileChooserDialogParams,
};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

use super::{cdp, DriverSession};
use crate::error::{DriverError, Result};

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);
const DOWNLOAD_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Outstanding one-shot upload arms, keyed by target id
#[derive(Default)]
pub(crate) struct TransferHub {
    uploads: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl TransferHub {
    pub(crate) async fn forget(&self, target_id: &str) {
        if let Some(task) = self.uploads.lock().await.remove(target_id) {
            task.abort();
        }
    }
}

/// In-progress artifacts the browser writes alongside a download
fn is_partial_download(name: &str) -> bool {
    name.ends_with(".crdownload") || name.ends_with(".tmp") || name.starts_with('.')
}

/// Pick the completed newcomer among the directory's current entries
fn pick_new_file(before: &HashSet<PathBuf>, entries: Vec<PathBuf>) -> Option<PathBuf> {
    entries.into_iter().find(|path| {
        if before.contains(path) {
            return false;
        }
        match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => !is_partial_download(name),
            None => false,
        }
    })
}

fn list_dir(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default()
}

impl DriverSession {
    /// Arm a one-shot file-chooser handler that answers the next chooser
    /// event on the target with the given paths. Re-arming replaces a
    /// pending arm; once consumed, a later chooser event finds no handler.
    pub async fn arm_upload(&self, target_id: &str, file_paths: Vec<String>) -> Result<()> {
        let page = self.resolve(target_id).await?;

        let intercept = SetInterceptFileChooserDialogParams::builder()
            .enabled(true)
            .build()
            .map_err(|e| DriverError::for_action("upload", target_id, e))?;
        page.execute(intercept)
            .await
            .map_err(|e| DriverError::for_action("upload", target_id, e))?;

        let mut stream = page
            .event_listener::<EventFileChooserOpened>()
            .await
            .map_err(|e| DriverError::for_action("upload", target_id, e))?;

        let chooser_page = page.clone();
        let task_target = target_id.to_string();
        let task = tokio::spawn(async move {
            if let Some(event) = stream.next().await {
                match event.backend_node_id.clone() {
                    Some(node_id) => {
                        let params = SetFileInputFilesParams::builder()
                            .files(file_paths.clone())
                            .backend_node_id(node_id)
                            .build();
                        match params {
                            Ok(params) => match chooser_page.execute(params).await {
                                Ok(_) => tracing::debug!(
                                    "Supplied {} file(s) to chooser on target {}",
                                    file_paths.len(),
                                    task_target
                                ),
                                Err(e) => {
                                    tracing::warn!("Failed to supply chooser files: {}", e)
                                }
                            },
                            Err(e) => tracing::warn!("Bad file input params: {}", e),
                        }
                    }
                    None => {
                        tracing::warn!("File chooser event carried no node id; files not supplied")
                    }
                }
            }

            // Consumed (or stream ended): stop intercepting so later
            // choosers behave normally
            if let Ok(disable) = SetInterceptFileChooserDialogParams::builder()
                .enabled(false)
                .build()
            {
                let _ = chooser_page.execute(disable).await;
            }
        });

        let mut uploads = self.transfers.uploads.lock().await;
        if let Some(previous) = uploads.insert(target_id.to_string(), task) {
            previous.abort();
        }

        tracing::debug!("File chooser armed for target {}", target_id);
        Ok(())
    }

    /// Wait for the next download triggered on the target and persist it
    /// under the session's download directory. Resolves with the saved path
    /// or fails after 30 seconds.
    pub async fn await_download(
        &self,
        target_id: &str,
        save_as: Option<&str>,
    ) -> Result<PathBuf> {
        // The handle must exist for a download to originate from this target
        self.resolve(target_id).await?;

        std::fs::create_dir_all(&self.download_dir)?;

        // Route downloads into our directory for the whole browser
        cdp::send(
            self.browser_ws_url(),
            "Browser.setDownloadBehavior",
            serde_json::json!({
                "behavior": "allow",
                "downloadPath": self.download_dir.to_string_lossy(),
            }),
        )
        .await
        .map_err(|e| DriverError::for_action("download", target_id, e))?;

        let before: HashSet<PathBuf> = list_dir(&self.download_dir).into_iter().collect();

        let deadline = Instant::now() + DOWNLOAD_TIMEOUT;
        let mut candidate: Option<(PathBuf, u64)> = None;

        loop {
            if Instant::now() > deadline {
                return Err(DriverError::DownloadTimeout(DOWNLOAD_TIMEOUT));
            }
            sleep(DOWNLOAD_POLL_INTERVAL).await;

            let Some(path) = pick_new_file(&before, list_dir(&self.download_dir)) else {
                continue;
            };
            let Ok(metadata) = std::fs::metadata(&path) else {
                continue;
            };
            let size = metadata.len();

            // Require a stable size across two polls before declaring the
            // file complete
            match candidate.take() {
                Some((previous, previous_size)) if previous == path && previous_size == size => {
                    let saved = match save_as {
                        Some(name) => {
                            let renamed = self.download_dir.join(name);
                            std::fs::rename(&path, &renamed)?;
                            renamed
                        }
                        None => path,
                    };
                    tracing::debug!("Download saved: {}", saved.display());
                    return Ok(saved);
                }
                _ => candidate = Some((path, size)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_artifacts_are_skipped() {
        assert!(is_partial_download("report.pdf.crdownload"));
        assert!(is_partial_download(".com.google.Chrome.x7Yz12"));
        assert!(is_partial_download("download.tmp"));
        assert!(!is_partial_download("report.pdf"));
    }

    #[test]
    fn pick_new_file_ignores_preexisting_entries() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("old.zip");
        let fresh = dir.path().join("fresh.zip");
        std::fs::write(&old, b"old").unwrap();
        std::fs::write(&fresh, b"fresh").unwrap();

        let before: HashSet<PathBuf> = [old.clone()].into_iter().collect();
        let picked = pick_new_file(&before, vec![old, fresh.clone()]);
        assert_eq!(picked, Some(fresh));
    }

    #[test]
    fn pick_new_file_skips_in_progress_downloads() {
        let dir = tempfile::tempdir().unwrap();
        let partial = dir.path().join("big.iso.crdownload");
        std::fs::write(&partial, b"...").unwrap();

        let before = HashSet::new();
        assert_eq!(pick_new_file(&before, vec![partial]), None);
    }
}
