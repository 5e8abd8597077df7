use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use tokio::time::sleep;

use super::discovery::{discover_browser, BrowserInfo};
use crate::config::ProfileConfig;
use crate::error::{DriverError, Result};

/// Launches a browser with remote debugging enabled and waits for the
/// control endpoint to come up.
pub struct BrowserLauncher {
    browser_info: BrowserInfo,
    cdp_port: u16,
    headless: bool,
    user_data_dir: PathBuf,
    extra_args: Vec<String>,
}

impl BrowserLauncher {
    /// Build a launcher from a profile, discovering the browser when the
    /// profile does not pin an executable.
    pub fn from_profile(profile_name: &str, profile: &ProfileConfig) -> Result<Self> {
        let browser_info = match profile.browser_path {
            Some(ref path) => {
                let path = PathBuf::from(shellexpand::tilde(path).to_string());
                if !path.exists() {
                    return Err(DriverError::BrowserLaunchFailed(format!(
                        "Browser not found at: {}",
                        path.display()
                    )));
                }
                BrowserInfo::new(super::discovery::BrowserKind::Chrome, path)
            }
            None => discover_browser()?,
        };

        let user_data_dir = match profile.user_data_dir {
            Some(ref dir) => PathBuf::from(shellexpand::tilde(dir).to_string()),
            None => dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("tabdriver")
                .join("profiles")
                .join(profile_name),
        };

        Ok(Self {
            browser_info,
            cdp_port: profile.cdp_port,
            headless: profile.headless,
            user_data_dir,
            extra_args: profile.extra_args.clone(),
        })
    }

    pub fn cdp_port(&self) -> u16 {
        self.cdp_port
    }

    fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            format!("--remote-debugging-port={}", self.cdp_port),
            format!("--user-data-dir={}", self.user_data_dir.display()),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            "--disable-infobars".to_string(),
            "--disable-save-password-bubble".to_string(),
        ];

        if self.headless {
            args.push("--headless=new".to_string());
        }

        args.extend(self.extra_args.clone());

        args
    }

    /// Spawn the browser process
    fn launch(&self) -> Result<Child> {
        std::fs::create_dir_all(&self.user_data_dir)?;

        let args = self.build_args();

        tracing::debug!(
            "Launching browser: {:?} with args: {:?}",
            self.browser_info.path,
            args
        );

        Command::new(&self.browser_info.path)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                DriverError::BrowserLaunchFailed(format!(
                    "Failed to launch {}: {}",
                    self.browser_info.kind.name(),
                    e
                ))
            })
    }

    /// Launch the browser and wait until the control endpoint answers,
    /// returning the child process and the browser WebSocket URL.
    pub async fn launch_and_wait(&self) -> Result<(Child, String)> {
        let child = self.launch()?;
        let cdp_url = self.wait_for_control_endpoint().await?;
        Ok((child, cdp_url))
    }

    /// Poll /json/version until the WebSocket URL appears (up to 10s)
    async fn wait_for_control_endpoint(&self) -> Result<String> {
        let url = format!("http://127.0.0.1:{}/json/version", self.cdp_port);
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        for attempt in 0..20 {
            sleep(Duration::from_millis(500)).await;

            match client.get(&url).send().await {
                Ok(response) if response.status().is_success() => {
                    let json: serde_json::Value = response.json().await.map_err(|e| {
                        DriverError::ControlEndpoint(format!(
                            "Malformed /json/version response: {}",
                            e
                        ))
                    })?;

                    if let Some(ws_url) = json.get("webSocketDebuggerUrl").and_then(|v| v.as_str())
                    {
                        tracing::info!("Control endpoint ready at: {}", ws_url);
                        return Ok(ws_url.to_string());
                    }
                }
                Ok(_) => {
                    tracing::debug!("Control endpoint not ready yet (attempt {})", attempt + 1);
                }
                Err(e) => {
                    tracing::debug!("Control endpoint attempt {} failed: {}", attempt + 1, e);
                }
            }
        }

        Err(DriverError::ControlEndpoint(
            "Timeout waiting for the control endpoint to come up".to_string(),
        ))
    }
}
