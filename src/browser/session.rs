//! Session lifecycle: the driver child process plus the remote session,
//! terminated exactly once no matter who asks first.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::json;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::browser::client::WebClient;
use crate::browser::wire::WireClient;
use crate::config::Config;

/// Implicit wait applied to element lookups, in milliseconds.
const IMPLICIT_WAIT_MS: u64 = 6_000;
/// How long to poll the driver's /status endpoint before giving up.
const READY_ATTEMPTS: u32 = 50;
const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A live browser session.
///
/// Cloning shares the same underlying session; any clone may terminate it.
/// The signal task holds one clone while the workflow holds another, and the
/// terminate-once guard collapses whichever call comes second.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    wire: WireClient,
    driver: Mutex<Option<Child>>,
    terminated: AtomicBool,
}

impl Session {
    /// Spawn the driver, create a remote session bound to the configured
    /// profile, and apply the session settings.
    pub async fn open(config: &Config) -> Result<Self> {
        let driver_path = config.driver_path();
        let port = free_port()?;
        let base_url = format!("http://127.0.0.1:{port}");

        let child = Command::new(&driver_path)
            .arg(format!("--port={port}"))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .stdin(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to spawn driver at {}", driver_path.display()))?;

        if let Err(e) = wait_ready(&base_url).await {
            kill_child(child).await;
            return Err(e);
        }

        let wire = match WireClient::new_session(&base_url, edge_capabilities(config)).await {
            Ok(wire) => wire,
            Err(e) => {
                kill_child(child).await;
                return Err(e).context("failed to create browser session");
            }
        };

        let session = Self {
            inner: Arc::new(SessionInner {
                wire,
                driver: Mutex::new(Some(child)),
                terminated: AtomicBool::new(false),
            }),
        };

        // Element lookups wait for late-rendered content; the window is
        // full-size unless the run is headless.
        if let Err(e) = session.inner.wire.set_implicit_wait(IMPLICIT_WAIT_MS).await {
            session.terminate().await;
            return Err(e).context("failed to set implicit wait");
        }
        if !config.headless {
            if let Err(e) = session.inner.wire.maximize_window().await {
                session.terminate().await;
                return Err(e).context("failed to maximize window");
            }
        }

        info!(port, "browser session open");
        Ok(session)
    }

    /// The wire client, viewed as the capability trait the locator consumes.
    pub fn client(&self) -> &dyn WebClient {
        &self.inner.wire
    }

    /// End the remote session and reap the driver process.
    ///
    /// Safe to call any number of times from any task; only the first call
    /// does work. Transport errors during quit are logged, never propagated,
    /// so teardown cannot mask the error that caused it.
    pub async fn terminate(&self) {
        if self.inner.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.inner.wire.delete_session().await {
            warn!("session quit failed: {e}");
        }
        if let Some(child) = self.inner.driver.lock().await.take() {
            kill_child(child).await;
        }
        debug!("browser session terminated");
    }
}

/// The W3C capabilities object for an Edge session bound to the configured
/// user-data directory and profile.
fn edge_capabilities(config: &Config) -> serde_json::Value {
    let mut args = vec![
        format!("--user-data-dir={}", config.user_data_dir.display()),
        format!("--profile-directory={}", config.profile_name),
    ];
    if config.headless {
        args.push("--headless=new".to_string());
    }
    json!({
        "alwaysMatch": {
            "browserName": "MicrosoftEdge",
            "ms:edgeOptions": { "args": args }
        }
    })
}

/// Poll the driver's /status endpoint until it accepts connections.
async fn wait_ready(base_url: &str) -> Result<()> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .context("failed to build HTTP client")?;

    for _ in 0..READY_ATTEMPTS {
        if let Ok(resp) = http.get(format!("{base_url}/status")).send().await {
            if resp.status().is_success() {
                return Ok(());
            }
        }
        tokio::time::sleep(READY_POLL_INTERVAL).await;
    }
    anyhow::bail!("driver did not become ready at {base_url}")
}

async fn kill_child(mut child: Child) {
    let _ = child.kill().await;
    let _ = child.wait().await;
}

/// Reserve an ephemeral local port for the driver endpoint.
fn free_port() -> Result<u16> {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0))
        .context("failed to reserve a local port")?;
    let port = listener
        .local_addr()
        .context("failed to read local port")?
        .port();
    Ok(port)
}

/// Resolves when a shutdown signal is received.
///
/// On Unix we listen for SIGTERM *and* Ctrl-C.
/// On other platforms we listen for Ctrl-C only.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
