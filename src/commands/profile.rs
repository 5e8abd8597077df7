use colored::Colorize;

use crate::cli::{Cli, ProfileCommands};
use crate::config::{Config, ProfileConfig};
use crate::error::{DriverError, Result};

pub async fn run(cli: &Cli, command: &ProfileCommands) -> Result<()> {
    match command {
        ProfileCommands::List => list(cli).await,
        ProfileCommands::Create { name, cdp_port } => create(cli, name, *cdp_port).await,
        ProfileCommands::Delete { name } => delete(cli, name).await,
        ProfileCommands::Show { name } => show(cli, name).await,
    }
}

async fn list(cli: &Cli) -> Result<()> {
    let config = Config::load()?;

    if cli.json {
        let profiles: Vec<_> = config
            .profiles
            .iter()
            .map(|(name, profile)| {
                serde_json::json!({
                    "name": name,
                    "cdp_port": profile.cdp_port,
                    "headless": profile.headless,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&profiles)?);
    } else {
        println!("{}", "Profiles:".bold());
        println!();

        for (name, profile) in &config.profiles {
            let default_marker = if name == &config.browser.default_profile {
                " (default)".dimmed()
            } else {
                "".into()
            };

            println!("  {} {}{}", "●".cyan(), name.bold(), default_marker);
            println!("    CDP port: {}", profile.cdp_port);
            if profile.headless {
                println!("    Mode: {}", "headless".dimmed());
            }
            println!();
        }
    }

    Ok(())
}

async fn create(_cli: &Cli, name: &str, cdp_port: Option<u16>) -> Result<()> {
    let mut config = Config::load()?;

    if config.profiles.contains_key(name) {
        return Err(DriverError::Config(format!(
            "Profile already exists: {}",
            name
        )));
    }

    let profile = match cdp_port {
        Some(port) => ProfileConfig::with_cdp_port(port),
        None => ProfileConfig::default(),
    };

    config.set_profile(name, profile);
    config.save()?;

    println!("{} Created profile '{}'", "✓".green(), name);
    Ok(())
}

async fn delete(_cli: &Cli, name: &str) -> Result<()> {
    let mut config = Config::load()?;
    config.remove_profile(name)?;
    config.save()?;

    println!("{} Deleted profile '{}'", "✓".green(), name);
    Ok(())
}

async fn show(cli: &Cli, name: &str) -> Result<()> {
    let config = Config::load()?;
    let profile = config.get_profile(name)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&profile)?);
    } else {
        println!("{}", name.bold());
        println!("  CDP port:  {}", profile.cdp_port);
        println!(
            "  Browser:   {}",
            profile.browser_path.as_deref().unwrap_or("(auto-discover)")
        );
        println!(
            "  Data dir:  {}",
            profile.user_data_dir.as_deref().unwrap_or("(default)")
        );
        println!(
            "  Downloads: {}",
            profile.download_dir.as_deref().unwrap_or("(default)")
        );
        println!("  Headless:  {}", profile.headless);
    }

    Ok(())
}
