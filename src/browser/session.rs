use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::launcher::BrowserLauncher;
use crate::config::Config;
use crate::driver::{DriverOptions, DriverSession};
use crate::error::{DriverError, Result};

/// Session state persisted to disk so separate CLI invocations reattach to
/// the same browser.
#[derive(Debug, Serialize, Deserialize)]
struct SessionState {
    profile_name: String,
    cdp_port: u16,
    pid: Option<u32>,
    cdp_url: String,
}

/// Manages browser sessions across CLI invocations
pub struct SessionManager {
    config: Config,
    sessions_dir: PathBuf,
}

impl SessionManager {
    pub fn new(config: Config) -> Self {
        let sessions_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tabdriver")
            .join("sessions");

        Self {
            config,
            sessions_dir,
        }
    }

    fn resolve_profile_name(&self, profile_name: Option<&str>) -> String {
        match profile_name.map(str::trim).filter(|s| !s.is_empty()) {
            Some(name) => name.to_string(),
            None => self.config.effective_default_profile_name(),
        }
    }

    fn session_file(&self, profile_name: &str) -> PathBuf {
        self.sessions_dir.join(format!("{}.json", profile_name))
    }

    fn load_session_state(&self, profile_name: &str) -> Option<SessionState> {
        let path = self.session_file(profile_name);
        if path.exists() {
            let content = fs::read_to_string(&path).ok()?;
            serde_json::from_str(&content).ok()
        } else {
            None
        }
    }

    fn save_session_state(&self, state: &SessionState) -> Result<()> {
        fs::create_dir_all(&self.sessions_dir)?;
        let path = self.session_file(&state.profile_name);
        let content = serde_json::to_string_pretty(state)?;
        fs::write(path, content)?;
        Ok(())
    }

    fn remove_session_state(&self, profile_name: &str) -> Result<()> {
        let path = self.session_file(profile_name);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Record a session for a browser started outside this tool
    pub fn save_external_session(
        &self,
        profile_name: &str,
        cdp_port: u16,
        cdp_url: &str,
    ) -> Result<()> {
        let state = SessionState {
            profile_name: profile_name.to_string(),
            cdp_port,
            pid: None,
            cdp_url: cdp_url.to_string(),
        };
        self.save_session_state(&state)
    }

    /// Check if a session is still alive by pinging its control endpoint
    async fn is_session_alive(&self, state: &SessionState) -> bool {
        let url = format!("http://127.0.0.1:{}/json/version", state.cdp_port);
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        client.get(&url).send().await.is_ok()
    }

    /// Fetch the current browser WebSocket URL from a CDP port via /json/version.
    /// The browser may have restarted on the same port, which generates a new
    /// session id and invalidates the cached URL.
    async fn fetch_browser_ws_url(&self, cdp_port: u16) -> Option<String> {
        let url = format!("http://127.0.0.1:{}/json/version", cdp_port);
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let resp = client.get(&url).send().await.ok()?;
        let info: serde_json::Value = resp.json().await.ok()?;
        info.get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }

    fn driver_options(&self, profile_name: &str, state: &SessionState) -> DriverOptions {
        let profile = self
            .config
            .get_profile(profile_name)
            .unwrap_or_default();

        DriverOptions {
            cdp_port: state.cdp_port,
            browser_ws_url: Some(state.cdp_url.clone()),
            settle_delay: Duration::from_millis(self.config.driver.settle_delay_ms),
            download_dir: self.config.download_dir(&profile),
        }
    }

    /// Attach to a live session for the profile, launching a browser when
    /// none is running.
    pub async fn ensure_session(&self, profile_name: Option<&str>) -> Result<DriverSession> {
        let profile_name = self.resolve_profile_name(profile_name);

        if let Some(mut state) = self.load_session_state(&profile_name) {
            if self.is_session_alive(&state).await {
                if let Some(fresh_url) = self.fetch_browser_ws_url(state.cdp_port).await {
                    if fresh_url != state.cdp_url {
                        tracing::debug!("Browser WebSocket URL changed, updating session");
                        state.cdp_url = fresh_url;
                        self.save_session_state(&state)?;
                    }
                }
                tracing::debug!("Reusing existing session for profile: {}", profile_name);
                return DriverSession::connect(self.driver_options(&profile_name, &state)).await;
            }
            tracing::debug!("Session for profile {} is dead, removing", profile_name);
            self.remove_session_state(&profile_name)?;
        }

        tracing::debug!("No live browser, launching one for profile: {}", profile_name);
        self.launch_session(&profile_name).await
    }

    /// Attach to an already-running session; never launches
    pub async fn attach(&self, profile_name: Option<&str>) -> Result<DriverSession> {
        let profile_name = self.resolve_profile_name(profile_name);

        let state = self
            .load_session_state(&profile_name)
            .ok_or(DriverError::SessionNotRunning)?;

        if !self.is_session_alive(&state).await {
            return Err(DriverError::SessionNotRunning);
        }

        DriverSession::connect(self.driver_options(&profile_name, &state)).await
    }

    async fn launch_session(&self, profile_name: &str) -> Result<DriverSession> {
        let profile = self.config.get_profile(profile_name)?;
        let launcher = BrowserLauncher::from_profile(profile_name, &profile)?;

        let (child, cdp_url) = launcher.launch_and_wait().await?;

        let state = SessionState {
            profile_name: profile_name.to_string(),
            cdp_port: launcher.cdp_port(),
            pid: Some(child.id()),
            cdp_url,
        };
        self.save_session_state(&state)?;

        DriverSession::connect(self.driver_options(profile_name, &state)).await
    }

    /// Close a browser session and forget its state
    pub async fn close_session(&self, profile_name: Option<&str>) -> Result<()> {
        let profile_name = self.resolve_profile_name(profile_name);

        if let Some(state) = self.load_session_state(&profile_name) {
            if self.is_session_alive(&state).await {
                match DriverSession::connect(self.driver_options(&profile_name, &state)).await {
                    Ok(session) => session.shutdown_browser().await,
                    Err(e) => tracing::warn!("Could not attach for shutdown: {}", e),
                }
            }
            self.remove_session_state(&profile_name)?;
        }

        Ok(())
    }

    /// Get browser status for a profile
    pub async fn get_status(&self, profile_name: Option<&str>) -> SessionStatus {
        let profile_name = self.resolve_profile_name(profile_name);

        match self.load_session_state(&profile_name) {
            Some(state) => {
                if self.is_session_alive(&state).await {
                    SessionStatus::Running {
                        profile: profile_name,
                        cdp_port: state.cdp_port,
                        cdp_url: state.cdp_url,
                    }
                } else {
                    SessionStatus::Stale {
                        profile: profile_name,
                    }
                }
            }
            None => SessionStatus::NotRunning {
                profile: profile_name,
            },
        }
    }
}

#[derive(Debug)]
pub enum SessionStatus {
    Running {
        profile: String,
        cdp_port: u16,
        cdp_url: String,
    },
    Stale {
        profile: String,
    },
    NotRunning {
        profile: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_session_manager(dir: &std::path::Path) -> SessionManager {
        SessionManager {
            config: Config::default(),
            sessions_dir: dir.to_path_buf(),
        }
    }

    #[test]
    fn save_and_load_external_session() {
        let dir = tempfile::tempdir().unwrap();
        let sm = test_session_manager(dir.path());

        sm.save_external_session(
            "test-profile",
            9222,
            "ws://127.0.0.1:9222/devtools/browser/abc",
        )
        .unwrap();

        let state = sm.load_session_state("test-profile").unwrap();
        assert_eq!(state.profile_name, "test-profile");
        assert_eq!(state.cdp_port, 9222);
        assert_eq!(state.cdp_url, "ws://127.0.0.1:9222/devtools/browser/abc");
        assert!(state.pid.is_none());
    }

    #[test]
    fn save_external_session_creates_sessions_dir() {
        let dir = tempfile::tempdir().unwrap();
        let sessions_dir = dir.path().join("nested").join("sessions");
        let sm = SessionManager {
            config: Config::default(),
            sessions_dir: sessions_dir.clone(),
        };

        assert!(!sessions_dir.exists());
        sm.save_external_session("default", 9222, "ws://localhost:9222")
            .unwrap();
        assert!(sessions_dir.join("default.json").exists());
    }

    #[test]
    fn remove_session_state_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let sm = test_session_manager(dir.path());

        sm.save_external_session("removeme", 9222, "ws://localhost:9222")
            .unwrap();
        assert!(sm.session_file("removeme").exists());

        sm.remove_session_state("removeme").unwrap();
        assert!(!sm.session_file("removeme").exists());
    }

    #[test]
    fn remove_nonexistent_session_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let sm = test_session_manager(dir.path());

        sm.remove_session_state("doesnotexist").unwrap();
    }

    #[tokio::test]
    async fn dead_session_reports_stale() {
        let dir = tempfile::tempdir().unwrap();
        let sm = test_session_manager(dir.path());

        // Points to a port nothing is listening on
        sm.save_external_session("dead", 19999, "ws://127.0.0.1:19999")
            .unwrap();

        let status = sm.get_status(Some("dead")).await;
        assert!(matches!(status, SessionStatus::Stale { .. }));
    }

    #[tokio::test]
    async fn no_session_reports_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let sm = test_session_manager(dir.path());

        let status = sm.get_status(Some("nonexistent")).await;
        assert!(matches!(status, SessionStatus::NotRunning { .. }));
    }

    #[tokio::test]
    async fn attach_without_session_fails_session_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let sm = test_session_manager(dir.path());

        let result = sm.attach(Some("ghost")).await;
        assert!(matches!(result, Err(DriverError::SessionNotRunning)));
    }

    #[tokio::test]
    async fn attach_with_dead_session_fails_session_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let sm = test_session_manager(dir.path());

        sm.save_external_session("dead", 19998, "ws://127.0.0.1:19998")
            .unwrap();

        let result = sm.attach(Some("dead")).await;
        assert!(matches!(result, Err(DriverError::SessionNotRunning)));
    }

    #[tokio::test]
    async fn none_profile_uses_configured_default_profile() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.browser.default_profile = "team-default".to_string();
        let sm = SessionManager {
            config,
            sessions_dir: dir.path().to_path_buf(),
        };

        let status = sm.get_status(None).await;
        assert!(matches!(
            status,
            SessionStatus::NotRunning { profile } if profile == "team-default"
        ));
    }
}
