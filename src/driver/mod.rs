//! Keeps the cached Edge WebDriver in lockstep with the installed browser.
//!
//! The browser version is the source of truth. When the cached driver
//! reports a different version (or there is no cached driver), the matching
//! build is downloaded from the driver CDN and unpacked over the old one.

use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::config::{Config, DRIVER_FILE};
use crate::error::UpdateError;

static VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+(?:\.\d+)+").expect("version regex"));

#[cfg(target_os = "macos")]
const CANDIDATE_BROWSERS: &[&str] = &[
    "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
    "microsoft-edge",
    "microsoft-edge-stable",
];
#[cfg(all(unix, not(target_os = "macos")))]
const CANDIDATE_BROWSERS: &[&str] = &[
    "microsoft-edge",
    "microsoft-edge-stable",
    "microsoft-edge-beta",
    "microsoft-edge-dev",
];

#[cfg(windows)]
const EDGE_BEACON_KEY: &str = r"HKCU\Software\Microsoft\Edge\BLBeacon";

#[cfg(all(target_os = "windows", target_arch = "aarch64"))]
const DRIVER_PLATFORM: &str = "arm64";
#[cfg(all(target_os = "windows", not(target_arch = "aarch64")))]
const DRIVER_PLATFORM: &str = "win64";
#[cfg(all(target_os = "macos", target_arch = "aarch64"))]
const DRIVER_PLATFORM: &str = "mac64_m1";
#[cfg(all(target_os = "macos", not(target_arch = "aarch64")))]
const DRIVER_PLATFORM: &str = "mac64";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const DRIVER_PLATFORM: &str = "linux64";

/// Ensure the cached driver matches the installed browser.
///
/// No-op when the two versions are equal. Otherwise downloads the matching
/// driver archive, replaces the old binary, and unpacks the new one.
pub async fn reconcile(config: &Config) -> Result<(), UpdateError> {
    let browser = installed_browser_version()
        .await
        .ok_or_else(|| UpdateError::BrowserNotInstalled {
            checked: probe_description(),
        })?;
    let driver_path = config.driver_path();
    let driver = driver_version(&driver_path).await;

    println!("Edge version:   {browser}");
    println!("Driver version: {}", driver.as_deref().unwrap_or(""));

    if !needs_update(&browser, driver.as_deref()) {
        debug!(version = %browser, "driver already matches browser");
        return Ok(());
    }

    let url = driver_url(&config.driver_base_url, &browser);
    let archive = config.data_dir.join(format!("edgedriver_{DRIVER_PLATFORM}.zip"));

    println!("Downloading driver");
    if let Err(e) = download(&url, &archive).await {
        return Err(UpdateError::DriverDownloadFailed {
            url,
            reason: format!("{e:#}"),
        });
    }

    if driver_path.exists() {
        if let Err(e) = std::fs::remove_file(&driver_path) {
            return Err(UpdateError::DriverDownloadFailed {
                url,
                reason: format!("cannot remove old driver: {e}"),
            });
        }
    }
    if let Err(e) = install_driver(&archive, &driver_path) {
        return Err(UpdateError::DriverDownloadFailed {
            url,
            reason: format!("{e:#}"),
        });
    }

    info!(version = %browser, "driver updated");
    Ok(())
}

/// Version of the installed Edge browser, if any.
///
/// The browser records its version in the registry at install time.
#[cfg(windows)]
async fn installed_browser_version() -> Option<String> {
    let output = tokio::process::Command::new("reg")
        .args(["query", EDGE_BEACON_KEY, "/v", "version"])
        .stdin(Stdio::null())
        .output()
        .await
        .ok()?;
    extract_version(&String::from_utf8_lossy(&output.stdout))
}

/// Version of the installed Edge browser, if any, asking each known binary
/// name in turn.
#[cfg(not(windows))]
async fn installed_browser_version() -> Option<String> {
    for candidate in CANDIDATE_BROWSERS {
        if let Some(version) = probe_version(candidate).await {
            return Some(version);
        }
    }
    None
}

/// Version reported by the cached driver binary, if it exists and runs.
async fn driver_version(path: &Path) -> Option<String> {
    if !path.is_file() {
        return None;
    }
    probe_version(&path.to_string_lossy()).await
}

/// Run `<program> --version` and pull a dotted version out of its output.
async fn probe_version(program: &str) -> Option<String> {
    let output = tokio::process::Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    extract_version(&String::from_utf8_lossy(&output.stdout))
}

fn extract_version(text: &str) -> Option<String> {
    VERSION_RE.find(text).map(|m| m.as_str().to_string())
}

/// What was probed, for the not-installed error message.
#[cfg(windows)]
fn probe_description() -> String {
    EDGE_BEACON_KEY.to_string()
}

#[cfg(not(windows))]
fn probe_description() -> String {
    CANDIDATE_BROWSERS.join(", ")
}

/// An update is needed unless the driver reports exactly the browser version.
fn needs_update(browser: &str, driver: Option<&str>) -> bool {
    driver != Some(browser)
}

fn driver_url(base: &str, version: &str) -> String {
    format!("{base}/{version}/edgedriver_{DRIVER_PLATFORM}.zip")
}

/// Stream the archive at `url` to `dest`, echoing progress to the console.
async fn download(url: &str, dest: &Path) -> Result<()> {
    use std::io::Write;

    print!("{url} ...");
    std::io::stdout().flush().ok();

    let client = reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(30))
        .timeout(std::time::Duration::from_secs(300))
        .build()
        .context("failed to build HTTP client")?;
    let mut response = client
        .get(url)
        .send()
        .await
        .context("request failed")?
        .error_for_status()
        .context("server rejected the request")?;

    let mut file = tokio::fs::File::create(dest)
        .await
        .with_context(|| format!("cannot create {}", dest.display()))?;
    while let Some(chunk) = response.chunk().await.context("download interrupted")? {
        file.write_all(&chunk)
            .await
            .with_context(|| format!("cannot write {}", dest.display()))?;
    }
    file.flush().await.context("cannot flush archive")?;

    println!();
    Ok(())
}

/// Unpack the driver binary out of the downloaded archive.
fn install_driver(archive: &Path, driver_path: &Path) -> Result<()> {
    let file = std::fs::File::open(archive)
        .with_context(|| format!("cannot open {}", archive.display()))?;
    let mut zip = zip::ZipArchive::new(file)
        .with_context(|| format!("cannot read {}", archive.display()))?;
    let mut entry = zip
        .by_name(DRIVER_FILE)
        .with_context(|| format!("archive has no {DRIVER_FILE}"))?;

    let mut out = std::fs::File::create(driver_path)
        .with_context(|| format!("cannot create {}", driver_path.display()))?;
    std::io::copy(&mut entry, &mut out)
        .with_context(|| format!("cannot unpack {}", driver_path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(driver_path, std::fs::Permissions::from_mode(0o755))
            .with_context(|| format!("cannot mark {} executable", driver_path.display()))?;
    }
    Ok(())
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_needs_update_only_on_mismatch() {
        assert!(!needs_update("126.0.2592.87", Some("126.0.2592.87")));
        assert!(needs_update("126.0.2592.87", Some("125.0.2535.67")));
        assert!(needs_update("126.0.2592.87", None));
        // A prefix is not a match.
        assert!(needs_update("126.0.2592.87", Some("126.0.2592")));
    }

    #[test]
    fn test_driver_url_shape() {
        let url = driver_url("https://msedgedriver.azureedge.net", "126.0.2592.87");
        assert!(url.starts_with("https://msedgedriver.azureedge.net/126.0.2592.87/edgedriver_"));
        assert!(url.ends_with(".zip"));
    }

    #[test]
    fn test_extract_version_from_probe_output() {
        // Shape of `msedgedriver --version` output.
        assert_eq!(
            extract_version("Microsoft Edge WebDriver 126.0.2592.87 (a1b2c3)"),
            Some("126.0.2592.87".to_string())
        );
        // Shape of a `reg query` value line.
        assert_eq!(
            extract_version("    version    REG_SZ    126.0.2592.87"),
            Some("126.0.2592.87".to_string())
        );
        assert_eq!(extract_version("no digits here"), None);
        // A bare integer is not a dotted version.
        assert_eq!(extract_version("build 42"), None);
    }

    #[test]
    fn test_install_driver_unpacks_binary() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("edgedriver.zip");
        let driver = dir.path().join(DRIVER_FILE);

        let file = std::fs::File::create(&archive).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file(DRIVER_FILE, options).unwrap();
        writer.write_all(b"#!/bin/sh\nexit 0\n").unwrap();
        writer.start_file("LICENSE", options).unwrap();
        writer.write_all(b"MIT").unwrap();
        writer.finish().unwrap();

        install_driver(&archive, &driver).unwrap();

        assert_eq!(std::fs::read(&driver).unwrap(), b"#!/bin/sh\nexit 0\n");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&driver).unwrap().permissions().mode();
            assert_ne!(mode & 0o111, 0);
        }
    }

    #[test]
    fn test_install_driver_rejects_archive_without_binary() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("empty.zip");

        let file = std::fs::File::create(&archive).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file("README", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"nothing useful").unwrap();
        writer.finish().unwrap();

        assert!(install_driver(&archive, &dir.path().join(DRIVER_FILE)).is_err());
    }
}
