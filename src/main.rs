use std::time::Duration;

use clap::Parser;
use geoipup::config::Config;
use geoipup::workflow;

/// Updates the Tor Metrics geoip database files by driving a real Edge
/// browser through the package registry.
#[derive(Parser)]
#[command(name = "geoipup", version)]
struct Args {
    /// Run the browser without a visible window
    #[arg(long)]
    headless: bool,

    /// On error, print the message and block forever instead of exiting
    #[arg(long)]
    pause_on_error: bool,

    /// Folder the database files are copied into (must exist)
    #[arg(long, env = "GEOIPUP_OUTPUT_FOLDER", value_name = "PATH")]
    output_folder: Option<std::path::PathBuf>,

    /// Minimum whole days between runs (0 = run every time)
    #[arg(long, env = "GEOIPUP_PERIOD_DAYS", value_name = "DAYS")]
    period_days: Option<i64>,

    /// Data directory for state, config, and work files
    #[arg(long, env = "GEOIPUP_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "GEOIPUP_LOG")]
    log: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = Config::new(
        args.headless,
        args.pause_on_error,
        args.output_folder,
        args.period_days,
        args.data_dir,
        args.log,
    );
    setup_logging(&config.log);

    match workflow::run(&config).await {
        Ok(outcome) => {
            tracing::debug!(?outcome, "run finished");
            std::process::exit(0);
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            if config.pause_on_error {
                // Keep the console window alive so the message can be read.
                loop {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
            std::process::exit(1);
        }
    }
}

// Init once, before any tracing calls.
fn setup_logging(log_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .compact()
        .init();
}
