use clap::{Parser, Subcommand};

use crate::commands;
use crate::error::Result;

/// Tabdriver - dual-protocol browser tab driver
#[derive(Parser)]
#[command(name = "tabdriver")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Profile name to use
    #[arg(short = 'P', long, env = "TABDRIVER_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Run launched browsers in headless mode
    #[arg(long, env = "TABDRIVER_HEADLESS", global = true)]
    pub headless: bool,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Browser and tab control
    Browser {
        #[command(subcommand)]
        command: BrowserCommands,
    },

    /// Example automation workflows
    Workflow {
        #[command(subcommand)]
        command: WorkflowCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Profile management
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
}

#[derive(Subcommand)]
pub enum BrowserCommands {
    /// Show session status
    Status,

    /// Launch (or reattach to) the browser for this profile
    Start,

    /// Close the browser and forget its session
    Stop,

    /// List all open tabs
    Tabs,

    /// Open a URL in a new tab
    Open {
        /// URL to open
        url: String,
    },

    /// Bring a tab to the foreground
    Focus {
        /// Target ID (from 'tabs')
        target_id: String,
    },

    /// Close a tab
    CloseTab {
        /// Target ID (from 'tabs')
        target_id: String,
    },

    /// Navigate a tab to a URL
    Navigate {
        /// Target ID
        target_id: String,
        /// URL to navigate to
        url: String,
    },

    /// Dispatch an action descriptor (JSON) against a tab
    Act {
        /// Target ID
        target_id: String,
        /// Action descriptor, e.g. '{"kind":"click","ref":"12"}'
        action: String,
    },

    /// Evaluate JavaScript over the raw protocol
    Eval {
        /// Target ID
        target_id: String,
        /// Expression to evaluate
        expression: String,
    },

    /// Resize a tab's viewport
    Resize {
        /// Target ID
        target_id: String,
        /// Viewport width
        width: i64,
        /// Viewport height
        height: i64,
    },

    /// Take a screenshot
    Screenshot {
        /// Target ID
        target_id: String,
        /// Output file path
        #[arg(default_value = "screenshot.png")]
        path: String,
        /// Capture the full page instead of the viewport
        #[arg(long)]
        full_page: bool,
        /// Save as JPEG with the given quality (0-100)
        #[arg(long)]
        jpeg_quality: Option<i64>,
    },

    /// Export a tab as PDF
    Pdf {
        /// Target ID
        target_id: String,
        /// Output file path
        path: String,
    },

    /// Get a page snapshot (accessibility outline or HTML)
    Snapshot {
        /// Target ID
        target_id: String,
        /// Snapshot format: aria or html
        #[arg(long, default_value = "aria")]
        format: String,
    },

    /// Capture and print console logs (first call arms capture)
    Console {
        /// Target ID
        target_id: String,
        /// Only entries of this level (log, warning, error, ...)
        #[arg(long)]
        level: Option<String>,
        /// Clear the buffer instead of printing
        #[arg(long)]
        clear: bool,
    },

    /// Capture and print network logs (first call arms capture)
    Network {
        /// Target ID
        target_id: String,
        /// Only entries whose URL contains this substring
        #[arg(long)]
        filter: Option<String>,
        /// Clear the buffer instead of printing
        #[arg(long)]
        clear: bool,
    },

    /// Arm the next file chooser with the given files
    Upload {
        /// Target ID
        target_id: String,
        /// Paths to supply
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Wait for the next download and save it
    Download {
        /// Target ID
        target_id: String,
        /// Save under this filename instead of the suggested one
        #[arg(long)]
        save_as: Option<String>,
    },

    /// Get or set cookies
    Cookies {
        /// Target ID
        target_id: String,
        #[command(subcommand)]
        command: Option<CookiesCommands>,
    },
}

#[derive(Subcommand)]
pub enum CookiesCommands {
    /// List all cookies
    List,
    /// Set a cookie from a JSON object
    Set {
        /// Cookie JSON, e.g. '{"name":"sid","value":"abc","domain":".example.com"}'
        cookie: String,
    },
}

#[derive(Subcommand)]
pub enum WorkflowCommands {
    /// Check a product price on a page
    PriceCheck {
        /// Product page URL
        url: String,
        /// CSS selector for the price element
        #[arg(long)]
        selector: Option<String>,
    },

    /// Collect headlines from a news page
    NewsHeadlines {
        /// News page URL
        url: String,
        /// Maximum number of headlines
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Capture a page at several viewport sizes
    ScreenshotDoc {
        /// Page URL
        url: String,
        /// Output directory
        #[arg(long, default_value = "screenshots")]
        out_dir: String,
    },

    /// Fill a form from a field map and optionally submit
    FormFill {
        /// Form page URL
        url: String,
        /// Fields JSON, e.g. '[{"ref":"#name","value":"Ada"}]'
        fields: String,
        /// Reference to click after filling
        #[arg(long)]
        submit_ref: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,
        /// Configuration value
        value: String,
    },

    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },

    /// Show configuration file path
    Path,
}

#[derive(Subcommand)]
pub enum ProfileCommands {
    /// List all profiles
    List,

    /// Create a new profile
    Create {
        /// Profile name
        name: String,

        /// CDP port
        #[arg(long)]
        cdp_port: Option<u16>,
    },

    /// Delete a profile
    Delete {
        /// Profile name
        name: String,
    },

    /// Show profile details
    Show {
        /// Profile name
        name: String,
    },
}

impl Cli {
    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Commands::Browser { command } => commands::browser::run(self, command).await,
            Commands::Workflow { command } => commands::workflow::run(self, command).await,
            Commands::Config { command } => commands::config::run(self, command).await,
            Commands::Profile { command } => commands::profile::run(self, command).await,
        }
    }
}
