use std::path::PathBuf;
use std::process::Command;

use crate::error::{DriverError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserKind {
    Chrome,
    Brave,
    Edge,
    Chromium,
}

impl BrowserKind {
    pub fn name(&self) -> &'static str {
        match self {
            BrowserKind::Chrome => "Google Chrome",
            BrowserKind::Brave => "Brave",
            BrowserKind::Edge => "Microsoft Edge",
            BrowserKind::Chromium => "Chromium",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrowserInfo {
    pub kind: BrowserKind,
    pub path: PathBuf,
    pub version: Option<String>,
}

impl BrowserInfo {
    pub fn new(kind: BrowserKind, path: PathBuf) -> Self {
        Self {
            kind,
            path,
            version: None,
        }
    }

    pub fn with_version(mut self) -> Self {
        self.version = detect_version(&self.path);
        self
    }
}

/// Discover the best available Chromium-family browser on the system
pub fn discover_browser() -> Result<BrowserInfo> {
    discover_all_browsers()
        .into_iter()
        .next()
        .ok_or(DriverError::BrowserNotFound)
}

/// Discover all available browsers, highest priority first
pub fn discover_all_browsers() -> Vec<BrowserInfo> {
    let mut found = Vec::new();

    for (kind, candidates) in browser_candidates() {
        if let Some(path) = candidates.into_iter().find_map(locate) {
            found.push(BrowserInfo::new(kind, path).with_version());
        }
    }

    found
}

/// Resolve a candidate to an existing path. Bare names are looked up on PATH.
fn locate(candidate: &'static str) -> Option<PathBuf> {
    let path = PathBuf::from(candidate);
    if path.is_absolute() {
        path.exists().then_some(path)
    } else {
        which::which(candidate).ok()
    }
}

fn browser_candidates() -> Vec<(BrowserKind, Vec<&'static str>)> {
    #[cfg(target_os = "macos")]
    {
        vec![
            (
                BrowserKind::Chrome,
                vec!["/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"],
            ),
            (
                BrowserKind::Brave,
                vec!["/Applications/Brave Browser.app/Contents/MacOS/Brave Browser"],
            ),
            (
                BrowserKind::Edge,
                vec!["/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge"],
            ),
            (
                BrowserKind::Chromium,
                vec!["/Applications/Chromium.app/Contents/MacOS/Chromium"],
            ),
        ]
    }

    #[cfg(target_os = "linux")]
    {
        vec![
            (
                BrowserKind::Chrome,
                vec![
                    "/usr/bin/google-chrome",
                    "/usr/bin/google-chrome-stable",
                    "google-chrome",
                    "google-chrome-stable",
                ],
            ),
            (
                BrowserKind::Brave,
                vec!["/usr/bin/brave-browser", "brave-browser", "brave"],
            ),
            (
                BrowserKind::Edge,
                vec!["/usr/bin/microsoft-edge", "microsoft-edge"],
            ),
            (
                BrowserKind::Chromium,
                vec![
                    "/usr/bin/chromium",
                    "/usr/bin/chromium-browser",
                    "/snap/bin/chromium",
                    "chromium",
                    "chromium-browser",
                ],
            ),
        ]
    }

    #[cfg(target_os = "windows")]
    {
        vec![
            (
                BrowserKind::Chrome,
                vec![
                    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
                    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
                ],
            ),
            (
                BrowserKind::Brave,
                vec![r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe"],
            ),
            (
                BrowserKind::Edge,
                vec![
                    r"C:\Program Files\Microsoft\Edge\Application\msedge.exe",
                    r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
                ],
            ),
        ]
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        vec![]
    }
}

/// Detect browser version from `--version` output like "Google Chrome 120.0.6099.109"
fn detect_version(path: &PathBuf) -> Option<String> {
    let output = Command::new(path).arg("--version").output().ok()?;

    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let version = stdout.trim();
    match version.rfind(' ') {
        Some(idx) => Some(version[idx + 1..].to_string()),
        None => Some(version.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_does_not_panic_without_browsers() {
        // Runs on any machine; asserts only that discovery is well-behaved
        let browsers = discover_all_browsers();
        for browser in &browsers {
            assert!(browser.path.exists());
            assert!(!browser.kind.name().is_empty());
        }
    }

    #[test]
    fn locate_rejects_missing_absolute_path() {
        assert!(locate("/nonexistent/browser/binary").is_none());
    }
}
