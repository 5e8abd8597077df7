use colored::Colorize;

use crate::cli::{Cli, ConfigCommands};
use crate::config::Config;
use crate::error::{DriverError, Result};

pub async fn run(cli: &Cli, command: &ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => show(cli).await,
        ConfigCommands::Set { key, value } => set(cli, key, value).await,
        ConfigCommands::Get { key } => get(cli, key).await,
        ConfigCommands::Path => path(cli).await,
    }
}

async fn show(cli: &Cli) -> Result<()> {
    let config = Config::load()?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        let toml_str =
            toml::to_string_pretty(&config).map_err(|e| DriverError::Config(e.to_string()))?;
        println!("{}", toml_str);
    }

    Ok(())
}

async fn set(_cli: &Cli, key: &str, value: &str) -> Result<()> {
    let mut config = Config::load()?;

    match key {
        "browser.executable" => config.browser.executable = Some(value.to_string()),
        "browser.default_profile" => config.browser.default_profile = value.to_string(),
        "browser.headless" => {
            config.browser.headless = value
                .parse()
                .map_err(|_| DriverError::Config("headless must be true or false".to_string()))?
        }
        "driver.settle_delay_ms" => {
            config.driver.settle_delay_ms = value
                .parse()
                .map_err(|_| DriverError::Config("settle_delay_ms must be a number".to_string()))?
        }
        "driver.download_dir" => config.driver.download_dir = Some(value.to_string()),
        _ => {
            return Err(DriverError::Config(format!("Unknown config key: {}", key)));
        }
    }

    config.save()?;
    println!("{} Set {} = {}", "✓".green(), key, value);

    Ok(())
}

async fn get(cli: &Cli, key: &str) -> Result<()> {
    let config = Config::load()?;

    let value = match key {
        "browser.executable" => config.browser.executable.clone(),
        "browser.default_profile" => Some(config.browser.default_profile.clone()),
        "browser.headless" => Some(config.browser.headless.to_string()),
        "driver.settle_delay_ms" => Some(config.driver.settle_delay_ms.to_string()),
        "driver.download_dir" => config.driver.download_dir.clone(),
        _ => {
            return Err(DriverError::Config(format!("Unknown config key: {}", key)));
        }
    };

    if cli.json {
        println!("{}", serde_json::json!({ "key": key, "value": value }));
    } else {
        match value {
            Some(v) => println!("{}", v),
            None => println!("{}", "(not set)".dimmed()),
        }
    }

    Ok(())
}

async fn path(_cli: &Cli) -> Result<()> {
    println!("{}", Config::config_path().display());
    Ok(())
}
