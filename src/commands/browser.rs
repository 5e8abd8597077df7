use std::path::Path;

use colored::Colorize;

use crate::browser::{SessionManager, SessionStatus};
use crate::cli::{BrowserCommands, Cli, CookiesCommands};
use crate::config::Config;
use crate::driver::{
    Action, DriverSession, ImageFormat, ScreenshotOptions, SnapshotFormat,
};
use crate::error::{DriverError, Result};

fn session_manager(cli: &Cli) -> Result<SessionManager> {
    let mut config = Config::load()?;
    if cli.headless {
        config.browser.headless = true;
    }
    Ok(SessionManager::new(config))
}

/// Attach to the running session for this profile
async fn attach(cli: &Cli) -> Result<DriverSession> {
    session_manager(cli)?.attach(cli.profile.as_deref()).await
}

pub async fn run(cli: &Cli, command: &BrowserCommands) -> Result<()> {
    match command {
        BrowserCommands::Status => status(cli).await,
        BrowserCommands::Start => start(cli).await,
        BrowserCommands::Stop => stop(cli).await,
        BrowserCommands::Tabs => tabs(cli).await,
        BrowserCommands::Open { url } => open(cli, url).await,
        BrowserCommands::Focus { target_id } => focus(cli, target_id).await,
        BrowserCommands::CloseTab { target_id } => close_tab(cli, target_id).await,
        BrowserCommands::Navigate { target_id, url } => navigate(cli, target_id, url).await,
        BrowserCommands::Act { target_id, action } => act(cli, target_id, action).await,
        BrowserCommands::Eval {
            target_id,
            expression,
        } => eval(cli, target_id, expression).await,
        BrowserCommands::Resize {
            target_id,
            width,
            height,
        } => resize(cli, target_id, *width, *height).await,
        BrowserCommands::Screenshot {
            target_id,
            path,
            full_page,
            jpeg_quality,
        } => screenshot(cli, target_id, path, *full_page, *jpeg_quality).await,
        BrowserCommands::Pdf { target_id, path } => pdf(cli, target_id, path).await,
        BrowserCommands::Snapshot { target_id, format } => snapshot(cli, target_id, format).await,
        BrowserCommands::Console {
            target_id,
            level,
            clear,
        } => console(cli, target_id, level.as_deref(), *clear).await,
        BrowserCommands::Network {
            target_id,
            filter,
            clear,
        } => network(cli, target_id, filter.as_deref(), *clear).await,
        BrowserCommands::Upload { target_id, files } => upload(cli, target_id, files).await,
        BrowserCommands::Download { target_id, save_as } => {
            download(cli, target_id, save_as.as_deref()).await
        }
        BrowserCommands::Cookies { target_id, command } => {
            cookies(cli, target_id, command.as_ref()).await
        }
    }
}

async fn status(cli: &Cli) -> Result<()> {
    let sm = session_manager(cli)?;
    let status = sm.get_status(cli.profile.as_deref()).await;

    match status {
        SessionStatus::Running {
            profile,
            cdp_port,
            cdp_url,
        } => {
            let session = sm.attach(Some(profile.as_str())).await?;
            let tabs = session.list_targets().await.map(|t| t.len()).unwrap_or(0);
            let driver_status = session.status().await;

            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "running": true,
                        "profile": profile,
                        "cdpPort": cdp_port,
                        "tabCount": tabs,
                        "automation": driver_status.automation_attached,
                    })
                );
            } else {
                println!("{} Browser running", "●".green());
                println!("  Profile:    {}", profile.bold());
                println!("  CDP port:   {}", cdp_port);
                println!("  CDP URL:    {}", cdp_url.dimmed());
                println!("  Open tabs:  {}", tabs);
                let automation = if driver_status.automation_attached {
                    "attached".green()
                } else {
                    "unavailable (actions disabled)".yellow()
                };
                println!("  Automation: {}", automation);
            }
        }
        SessionStatus::Stale { profile } => {
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({ "running": false, "profile": profile, "stale": true })
                );
            } else {
                println!("{} Session for '{}' is stale", "●".yellow(), profile);
            }
        }
        SessionStatus::NotRunning { profile } => {
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({ "running": false, "profile": profile })
                );
            } else {
                println!("{} No browser running for '{}'", "●".red(), profile);
            }
        }
    }

    Ok(())
}

async fn start(cli: &Cli) -> Result<()> {
    let sm = session_manager(cli)?;
    let session = sm.ensure_session(cli.profile.as_deref()).await?;
    let driver_status = session.status().await;

    println!(
        "{} Browser ready on port {}",
        "✓".green(),
        driver_status.cdp_port
    );
    if !driver_status.automation_attached {
        println!(
            "{} Automation layer unavailable; interactive actions are disabled",
            "!".yellow()
        );
    }
    Ok(())
}

async fn stop(cli: &Cli) -> Result<()> {
    session_manager(cli)?
        .close_session(cli.profile.as_deref())
        .await?;
    println!("{} Browser stopped", "✓".green());
    Ok(())
}

async fn tabs(cli: &Cli) -> Result<()> {
    let session = attach(cli).await?;
    let targets = session.list_targets().await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&targets)?);
    } else if targets.is_empty() {
        println!("No open tabs");
    } else {
        for target in &targets {
            println!("{}  {}", target.id.bold(), target.title);
            println!("    {}", target.url.dimmed());
        }
    }
    Ok(())
}

async fn open(cli: &Cli, url: &str) -> Result<()> {
    let sm = session_manager(cli)?;
    let session = sm.ensure_session(cli.profile.as_deref()).await?;
    let target = session.open_target(url).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&target)?);
    } else {
        println!("{} Opened {}", "✓".green(), target.id.bold());
        println!("  {}", target.url.dimmed());
    }
    Ok(())
}

async fn focus(cli: &Cli, target_id: &str) -> Result<()> {
    let session = attach(cli).await?;
    session.activate_target(target_id).await?;
    println!("{} Focused {}", "✓".green(), target_id);
    Ok(())
}

async fn close_tab(cli: &Cli, target_id: &str) -> Result<()> {
    let session = attach(cli).await?;
    session.close_target(target_id).await?;
    println!("{} Closed {}", "✓".green(), target_id);
    Ok(())
}

async fn navigate(cli: &Cli, target_id: &str, url: &str) -> Result<()> {
    let session = attach(cli).await?;
    session.navigate(target_id, url).await?;
    println!("{} Navigated to {}", "✓".green(), url);
    Ok(())
}

async fn act(cli: &Cli, target_id: &str, action_json: &str) -> Result<()> {
    let action: Action = serde_json::from_str(action_json)?;
    let session = attach(cli).await?;
    let result = session.dispatch(target_id, &action).await?;

    if result.is_null() {
        println!("{} {}", "✓".green(), action.kind());
    } else {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }
    Ok(())
}

async fn eval(cli: &Cli, target_id: &str, expression: &str) -> Result<()> {
    let session = attach(cli).await?;
    let value = session.evaluate_raw(target_id, expression).await?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

async fn resize(cli: &Cli, target_id: &str, width: i64, height: i64) -> Result<()> {
    let session = attach(cli).await?;
    let action: Action = serde_json::from_value(serde_json::json!({
        "kind": "resize",
        "width": width,
        "height": height,
    }))?;
    session.dispatch(target_id, &action).await?;
    println!("{} Viewport set to {}x{}", "✓".green(), width, height);
    Ok(())
}

async fn screenshot(
    cli: &Cli,
    target_id: &str,
    path: &str,
    full_page: bool,
    jpeg_quality: Option<i64>,
) -> Result<()> {
    let session = attach(cli).await?;

    let options = ScreenshotOptions {
        format: if jpeg_quality.is_some() {
            ImageFormat::Jpeg
        } else {
            ImageFormat::Png
        },
        quality: jpeg_quality,
        full_page,
    };

    let bytes = session.screenshot(target_id, &options).await?;
    std::fs::write(path, &bytes)?;
    println!("{} Screenshot saved to {} ({} bytes)", "✓".green(), path, bytes.len());
    Ok(())
}

async fn pdf(cli: &Cli, target_id: &str, path: &str) -> Result<()> {
    let session = attach(cli).await?;
    let bytes = session.pdf(target_id).await?;
    std::fs::write(path, &bytes)?;
    println!("{} PDF saved to {} ({} bytes)", "✓".green(), path, bytes.len());
    Ok(())
}

async fn snapshot(cli: &Cli, target_id: &str, format: &str) -> Result<()> {
    let format = match format.to_lowercase().as_str() {
        "html" => SnapshotFormat::Html,
        "aria" => SnapshotFormat::Aria,
        other => {
            return Err(DriverError::Other(format!(
                "Unknown snapshot format: {} (use aria or html)",
                other
            )))
        }
    };

    let session = attach(cli).await?;
    let snapshot = session.snapshot(target_id, format).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        println!("{}", snapshot.content);
    }
    Ok(())
}

async fn console(cli: &Cli, target_id: &str, level: Option<&str>, clear: bool) -> Result<()> {
    let session = attach(cli).await?;

    if clear {
        session.clear_console_logs(target_id).await;
        println!("{} Console logs cleared", "✓".green());
        return Ok(());
    }

    session.start_console_capture(target_id).await?;
    let logs = session.console_logs(target_id, level).await;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&logs)?);
    } else if logs.is_empty() {
        println!("(no buffered console entries; capture is armed)");
    } else {
        for entry in &logs {
            let level = match entry.level.as_str() {
                "error" => entry.level.red(),
                "warning" => entry.level.yellow(),
                _ => entry.level.normal(),
            };
            println!("[{}] {}", level, entry.text);
        }
    }
    Ok(())
}

async fn network(cli: &Cli, target_id: &str, filter: Option<&str>, clear: bool) -> Result<()> {
    let session = attach(cli).await?;

    if clear {
        session.clear_network_logs(target_id).await;
        println!("{} Network logs cleared", "✓".green());
        return Ok(());
    }

    session.start_network_capture(target_id).await?;
    let logs = session.network_logs(target_id, filter).await;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&logs)?);
    } else if logs.is_empty() {
        println!("(no buffered network entries; capture is armed)");
    } else {
        for entry in &logs {
            match entry.status {
                Some(status) => println!("{} {} {}", "←".dimmed(), status, entry.url),
                None => println!(
                    "{} {} {}",
                    "→".dimmed(),
                    entry.method.as_deref().unwrap_or("?"),
                    entry.url
                ),
            }
        }
    }
    Ok(())
}

async fn upload(cli: &Cli, target_id: &str, files: &[String]) -> Result<()> {
    for file in files {
        if !Path::new(file).exists() {
            return Err(DriverError::Other(format!("File not found: {}", file)));
        }
    }

    let session = attach(cli).await?;
    session.arm_upload(target_id, files.to_vec()).await?;
    println!(
        "{} File chooser armed with {} file(s)",
        "✓".green(),
        files.len()
    );
    Ok(())
}

async fn download(cli: &Cli, target_id: &str, save_as: Option<&str>) -> Result<()> {
    let session = attach(cli).await?;
    let path = session.await_download(target_id, save_as).await?;
    println!("{} Download saved to {}", "✓".green(), path.display());
    Ok(())
}

async fn cookies(cli: &Cli, target_id: &str, command: Option<&CookiesCommands>) -> Result<()> {
    let session = attach(cli).await?;

    match command {
        None | Some(CookiesCommands::List) => {
            let cookies = session.cookies(target_id).await?;
            println!("{}", serde_json::to_string_pretty(&cookies)?);
        }
        Some(CookiesCommands::Set { cookie }) => {
            let cookie: serde_json::Value = serde_json::from_str(cookie)?;
            session.set_cookie(target_id, cookie).await?;
            println!("{} Cookie set", "✓".green());
        }
    }
    Ok(())
}
