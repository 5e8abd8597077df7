mod profile;

pub use profile::ProfileConfig;

use std::collections::HashMap;
use std::path::PathBuf;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{DriverError, Result};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Driver tuning knobs
    #[serde(default)]
    pub driver: DriverConfig,

    /// Browser configuration
    #[serde(default)]
    pub browser: BrowserConfig,

    /// Named profiles
    #[serde(default)]
    pub profiles: HashMap<String, ProfileConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Settle delay before page-handle resolution, in milliseconds
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Default download directory
    pub download_dir: Option<String>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
            download_dir: None,
        }
    }
}

fn default_settle_delay_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Browser executable path (overrides auto-discovery)
    pub executable: Option<String>,

    /// Default profile name
    #[serde(default = "default_profile_name")]
    pub default_profile: String,

    /// Default headless mode
    #[serde(default)]
    pub headless: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable: None,
            default_profile: default_profile_name(),
            headless: false,
        }
    }
}

fn default_profile_name() -> String {
    "tabdriver".to_string()
}

fn normalize_default_profile_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        default_profile_name()
    } else {
        trimmed.to_string()
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut profiles = HashMap::new();
        profiles.insert(default_profile_name(), ProfileConfig::default());

        Self {
            driver: DriverConfig::default(),
            browser: BrowserConfig::default(),
            profiles,
        }
    }
}

impl Config {
    pub fn effective_default_profile_name(&self) -> String {
        normalize_default_profile_name(&self.browser.default_profile)
    }

    /// Load configuration from all sources (file, env, defaults)
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let config: Config = Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Config::default()))
            // Merge config file if exists
            .merge(Toml::file(&config_path))
            // Merge environment variables (TABDRIVER_*)
            .merge(Env::prefixed("TABDRIVER_").split("_"))
            .extract()
            .map_err(|e| DriverError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Get the configuration file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tabdriver")
            .join("config.toml")
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| DriverError::Config(e.to_string()))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Resolved download directory for a profile, falling back to the driver
    /// default and finally to a per-user data dir.
    pub fn download_dir(&self, profile: &ProfileConfig) -> PathBuf {
        let configured = profile
            .download_dir
            .as_ref()
            .or(self.driver.download_dir.as_ref());

        match configured {
            Some(dir) => PathBuf::from(shellexpand::tilde(dir).to_string()),
            None => dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("tabdriver")
                .join("downloads"),
        }
    }

    /// Get a profile by name, falling back to default
    pub fn get_profile(&self, name: &str) -> Result<ProfileConfig> {
        let normalized_name = name.trim();

        // First check named profiles
        if let Some(profile) = self.profiles.get(normalized_name) {
            return Ok(profile.clone());
        }

        // If asking for configured default profile and it doesn't exist, create an implicit one.
        if normalized_name == self.effective_default_profile_name() {
            let mut profile = ProfileConfig::default();

            // Apply browser config defaults
            if let Some(ref exe) = self.browser.executable {
                profile.browser_path = Some(exe.clone());
            }
            profile.headless = self.browser.headless;

            return Ok(profile);
        }

        Err(DriverError::ProfileNotFound(normalized_name.to_string()))
    }

    /// Add or update a profile
    pub fn set_profile(&mut self, name: &str, profile: ProfileConfig) {
        self.profiles.insert(name.to_string(), profile);
    }

    /// Remove a profile
    pub fn remove_profile(&mut self, name: &str) -> Result<()> {
        let normalized_name = name.trim();

        if normalized_name == self.effective_default_profile_name() {
            return Err(DriverError::Config(
                "Cannot remove the default profile".to_string(),
            ));
        }

        self.profiles
            .remove(normalized_name)
            .ok_or_else(|| DriverError::ProfileNotFound(normalized_name.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_tabdriver_profile() {
        let config = Config::default();

        assert_eq!(config.browser.default_profile, "tabdriver");
        assert!(config.profiles.contains_key("tabdriver"));
    }

    #[test]
    fn get_profile_returns_implicit_configured_default_profile() {
        let config = Config {
            driver: DriverConfig::default(),
            browser: BrowserConfig {
                executable: Some("/usr/bin/google-chrome".to_string()),
                default_profile: "team".to_string(),
                headless: true,
            },
            profiles: HashMap::new(),
        };

        let profile = config.get_profile("team").unwrap();
        assert_eq!(
            profile.browser_path.as_deref(),
            Some("/usr/bin/google-chrome")
        );
        assert!(profile.headless);
    }

    #[test]
    fn get_profile_returns_error_for_non_default_missing_profile() {
        let config = Config::default();
        let result = config.get_profile("missing-profile");

        assert!(matches!(
            result,
            Err(DriverError::ProfileNotFound(name)) if name == "missing-profile"
        ));
    }

    #[test]
    fn get_profile_uses_tabdriver_when_config_default_is_blank() {
        let config = Config {
            driver: DriverConfig::default(),
            browser: BrowserConfig {
                executable: None,
                default_profile: "   ".to_string(),
                headless: false,
            },
            profiles: HashMap::new(),
        };

        assert!(config.get_profile("tabdriver").is_ok());
    }

    #[test]
    fn remove_profile_blocks_configured_default_profile() {
        let mut config = Config::default();
        config.browser.default_profile = "team".to_string();
        config.set_profile("team", ProfileConfig::default());

        let result = config.remove_profile("team");
        assert!(matches!(result, Err(DriverError::Config(_))));
    }

    #[test]
    fn download_dir_prefers_profile_over_driver_default() {
        let mut config = Config::default();
        config.driver.download_dir = Some("/tmp/driver-wide".to_string());

        let mut profile = ProfileConfig::default();
        assert_eq!(
            config.download_dir(&profile),
            PathBuf::from("/tmp/driver-wide")
        );

        profile.download_dir = Some("/tmp/per-profile".to_string());
        assert_eq!(
            config.download_dir(&profile),
            PathBuf::from("/tmp/per-profile")
        );
    }
}
