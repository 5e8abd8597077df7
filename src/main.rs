use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tabdriver::cli::Cli;
use tabdriver::error::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Default filter suppresses noisy chromiumoxide errors; they occur when
    // the browser sends CDP events the library doesn't recognize
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info")
            .add_directive("chromiumoxide::conn=warn".parse().unwrap())
            .add_directive("chromiumoxide::handler=warn".parse().unwrap())
    });

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let cli = Cli::parse();
    cli.run().await
}
