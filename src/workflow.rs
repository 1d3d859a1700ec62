//! One update run end to end: interval gate, console banner, driver
//! reconciliation, browser session, locate, fetch, install.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::debug;

use crate::browser::{shutdown_signal, Session, WebClient};
use crate::config::Config;
use crate::error::UpdateError;
use crate::{driver, gate, locator, pipeline};

/// Pause after a successful pipeline before tearing the session down.
const SETTLE_DELAY: Duration = Duration::from_millis(1500);

/// How a run ended short of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The update pipeline ran to completion.
    Completed,
    /// The configured interval has not elapsed; nothing was done.
    SkippedInterval,
}

/// One full update run.
///
/// A skipped interval returns before anything is printed; a skipped run has
/// no observable output at all.
pub async fn run(config: &Config) -> Result<Outcome> {
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("cannot create data dir {}", config.data_dir.display()))?;

    if !gate::check_and_record(&config.data_dir, config.period_days, Utc::now())? {
        return Ok(Outcome::SkippedInterval);
    }

    print_banner(config);
    config.ensure_output_dir()?;
    driver::reconcile(config).await?;

    let session = Session::open(config).await?;

    // A signal tears the session down and forces the error exit code, no
    // matter where the pipeline is.
    let interrupt = session.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        println!(">> interrupt");
        interrupt.terminate().await;
        eprintln!("error: {}", UpdateError::SignalInterrupt);
        std::process::exit(1);
    });

    let result = execute(config, session.client()).await;
    if result.is_ok() {
        println!(">> OK");
        tokio::time::sleep(SETTLE_DELAY).await;
    }
    session.terminate().await;
    result.map(|()| Outcome::Completed)
}

/// The browser-driven part of the run, separated from session plumbing so a
/// canned client can drive it.
pub async fn execute(config: &Config, client: &dyn WebClient) -> Result<()> {
    let link = locator::locate(client, &config.registry_url, &locator::ARTIFACT_NAME_RE).await?;
    debug!(filename = %link.filename, "artifact resolved");
    pipeline::run(config, &link).await
}

fn print_banner(config: &Config) {
    const RULE: &str = "=====================================================================";
    println!("{RULE}");
    println!("geoipup v{}", env!("CARGO_PKG_VERSION"));
    println!("{RULE}");
    println!("Download webdriver of the same version as installed Edge browser");
    println!("https://developer.microsoft.com/en-us/microsoft-edge/tools/webdriver/");
    println!("{RULE}");
    println!("--headless");
    println!("--pause-on-error");
    println!("--output-folder=<PATH>");
    println!("--period-days=<DOWNLOAD_INTERVAL>");
    println!("{RULE}");
    println!("Return code 0 - success, 1 - error");
    println!("{RULE}");
    println!("Edge user data dir: {}", config.user_data_dir.display());
    println!("Edge profile:       {}", config.profile_name);
    println!("Edge driver:        {}", config.driver_path().display());
    println!("Data directory:     {}", config.data_dir.display());
    println!("Output folder:      {}", config.output_dir.display());
    println!();
}
