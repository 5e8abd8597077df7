//! Example workflows: simple sequential callers of the driver's public
//! operations.

use std::path::Path;
use std::time::Duration;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use crate::browser::SessionManager;
use crate::cli::{Cli, WorkflowCommands};
use crate::config::Config;
use crate::driver::{Action, DriverSession, ScreenshotOptions};
use crate::error::Result;

pub async fn run(cli: &Cli, command: &WorkflowCommands) -> Result<()> {
    match command {
        WorkflowCommands::PriceCheck { url, selector } => {
            price_check(cli, url, selector.as_deref()).await
        }
        WorkflowCommands::NewsHeadlines { url, limit } => news_headlines(cli, url, *limit).await,
        WorkflowCommands::ScreenshotDoc { url, out_dir } => {
            screenshot_doc(cli, url, out_dir).await
        }
        WorkflowCommands::FormFill {
            url,
            fields,
            submit_ref,
        } => form_fill(cli, url, fields, submit_ref.as_deref()).await,
    }
}

async fn session(cli: &Cli) -> Result<DriverSession> {
    let mut config = Config::load()?;
    if cli.headless {
        config.browser.headless = true;
    }
    SessionManager::new(config)
        .ensure_session(cli.profile.as_deref())
        .await
}

fn step(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

fn action(value: serde_json::Value) -> Result<Action> {
    Ok(serde_json::from_value(value)?)
}

async fn settle(session: &DriverSession, target_id: &str, ms: u64) -> Result<()> {
    session
        .dispatch(
            target_id,
            &action(serde_json::json!({ "kind": "wait", "timeMs": ms }))?,
        )
        .await?;
    Ok(())
}

async fn price_check(cli: &Cli, url: &str, selector: Option<&str>) -> Result<()> {
    let session = session(cli).await?;

    let spinner = step("Opening product page...");
    let target = session.open_target(url).await?;
    settle(&session, &target.id, 3000).await?;
    spinner.finish_with_message("Page loaded");

    let spinner = step("Extracting price...");
    let selector_json = serde_json::to_string(selector.unwrap_or("body"))?;
    let body = format!(
        "() => {{ \
            const el = document.querySelector({selector_json}); \
            const text = el ? el.textContent : ''; \
            const m = text.match(/\\$?([0-9,]+\\.?[0-9]*)/); \
            return m ? parseFloat(m[1].replace(/,/g, '')) : null; \
        }}"
    );
    let price = session
        .dispatch(
            &target.id,
            &action(serde_json::json!({ "kind": "evaluate", "fn": body }))?,
        )
        .await?;
    spinner.finish_and_clear();

    let screenshot = session
        .screenshot(&target.id, &ScreenshotOptions::default())
        .await?;
    std::fs::write("price-check.png", &screenshot)?;

    session.close_target(&target.id).await?;

    println!();
    println!("  URL:   {}", url.dimmed());
    match price.as_f64() {
        Some(price) => println!("  Price: {}", format!("${:.2}", price).green().bold()),
        None => println!("  Price: {}", "not found".yellow()),
    }
    println!("  Shot:  price-check.png");

    Ok(())
}

async fn news_headlines(cli: &Cli, url: &str, limit: usize) -> Result<()> {
    let session = session(cli).await?;

    let spinner = step("Loading news page...");
    let target = session.open_target(url).await?;
    settle(&session, &target.id, 3000).await?;
    spinner.finish_and_clear();

    let body = format!(
        "() => Array.from(document.querySelectorAll('h1, h2, h3')) \
            .map(el => el.textContent.trim()) \
            .filter(t => t.length > 15 && t.length < 200) \
            .slice(0, {limit})"
    );
    let headlines = session
        .dispatch(
            &target.id,
            &action(serde_json::json!({ "kind": "evaluate", "fn": body }))?,
        )
        .await?;

    session.close_target(&target.id).await?;

    println!();
    println!("{}", "Headlines".bold());
    match headlines.as_array() {
        Some(items) if !items.is_empty() => {
            for (index, item) in items.iter().enumerate() {
                println!("  {:>2}. {}", index + 1, item.as_str().unwrap_or_default());
            }
        }
        _ => println!("  {}", "none found".yellow()),
    }

    Ok(())
}

async fn screenshot_doc(cli: &Cli, url: &str, out_dir: &str) -> Result<()> {
    const VIEWPORTS: &[(&str, i64, i64)] = &[
        ("desktop", 1920, 1080),
        ("tablet", 1024, 768),
        ("mobile", 390, 844),
    ];

    let session = session(cli).await?;
    std::fs::create_dir_all(out_dir)?;

    let spinner = step("Loading page...");
    let target = session.open_target(url).await?;
    settle(&session, &target.id, 2000).await?;
    spinner.finish_and_clear();

    for (label, width, height) in VIEWPORTS {
        let spinner = step(&format!("Capturing {} ({}x{})...", label, width, height));
        session
            .dispatch(
                &target.id,
                &action(serde_json::json!({
                    "kind": "resize", "width": width, "height": height
                }))?,
            )
            .await?;
        settle(&session, &target.id, 500).await?;

        let bytes = session
            .screenshot(&target.id, &ScreenshotOptions::default())
            .await?;
        let path = Path::new(out_dir).join(format!("{}-{}x{}.png", label, width, height));
        std::fs::write(&path, &bytes)?;
        spinner.finish_with_message(format!("{} saved", path.display()));
    }

    session.close_target(&target.id).await?;
    println!();
    println!(
        "{} Captured {} viewport(s) into {}",
        "✓".green(),
        VIEWPORTS.len(),
        out_dir
    );

    Ok(())
}

async fn form_fill(cli: &Cli, url: &str, fields: &str, submit_ref: Option<&str>) -> Result<()> {
    let fields: serde_json::Value = serde_json::from_str(fields)?;

    let session = session(cli).await?;

    let spinner = step("Loading form...");
    let target = session.open_target(url).await?;
    settle(&session, &target.id, 2000).await?;
    spinner.finish_and_clear();

    let spinner = step("Filling fields...");
    session
        .dispatch(
            &target.id,
            &action(serde_json::json!({ "kind": "fill", "fields": fields }))?,
        )
        .await?;
    spinner.finish_with_message("Fields filled");

    if let Some(reference) = submit_ref {
        let spinner = step("Submitting...");
        session
            .dispatch(
                &target.id,
                &action(serde_json::json!({ "kind": "click", "ref": reference }))?,
            )
            .await?;
        settle(&session, &target.id, 2000).await?;
        spinner.finish_with_message("Submitted");
    }

    let bytes = session
        .screenshot(&target.id, &ScreenshotOptions::default())
        .await?;
    std::fs::write("form-result.png", &bytes)?;

    session.close_target(&target.id).await?;

    println!();
    println!("{} Form workflow complete (form-result.png)", "✓".green());

    Ok(())
}
