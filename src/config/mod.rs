use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::UpdateError;

const DEFAULT_REGISTRY_URL: &str =
    "https://gitlab.torproject.org/tpo/network-health/metrics/geoip-data/-/packages";
const DEFAULT_DRIVER_BASE_URL: &str = "https://msedgedriver.azureedge.net";
const DEFAULT_EXPECTED_FILES: &[&str] = &["geoip", "geoip6"];
const DEFAULT_PROFILE_NAME: &str = "Selenium";
const DEFAULT_OUTPUT_DIR: &str = ".";

/// Filename of the fetched artifact archive inside the data directory.
pub(crate) const ARCHIVE_NAME: &str = "geoip.zip";

#[cfg(windows)]
pub(crate) const DRIVER_FILE: &str = "msedgedriver.exe";
#[cfg(not(windows))]
pub(crate) const DRIVER_FILE: &str = "msedgedriver";

// ─── TOML config file ─────────────────────────────────────────────────────────

/// `{data_dir}/config.toml`; all fields are optional overrides.
/// Priority: CLI / env var  >  TOML  >  built-in default.
#[derive(Deserialize, Default)]
struct TomlConfig {
    /// Run the browser without a visible window.
    headless: Option<bool>,
    /// Keep the process alive after a fatal error for inspection.
    pause_on_error: Option<bool>,
    /// Destination folder for the extracted database files.
    output_folder: Option<PathBuf>,
    /// Minimum days between runs; 0 or less runs every time.
    period_days: Option<i64>,
    /// Log level filter string, e.g. "debug", "info,geoipup=trace".
    log: Option<String>,
    /// Package registry page listing the artifact releases.
    registry_url: Option<String>,
    /// Base URL the driver archives are served from.
    driver_base_url: Option<String>,
    /// Member filenames the artifact archive must yield.
    expected_files: Option<Vec<String>>,
    /// External fetch tool: program followed by its arguments, with `{url}`
    /// and `{output}` substituted at spawn time. Overrides the PATH probe.
    fetch_command: Option<Vec<String>>,
}

fn load_toml(data_dir: &Path) -> Option<TomlConfig> {
    let path = data_dir.join("config.toml");
    let contents = std::fs::read_to_string(&path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            // Runs before logging is up, so this goes straight to stderr.
            eprintln!("warn: could not parse '{}': {e}", path.display());
            None
        }
    }
}

// ─── Config ───────────────────────────────────────────────────────────────────

/// Resolved configuration for one run, carried explicitly through the
/// workflow instead of living in globals.
#[derive(Debug, Clone)]
pub struct Config {
    /// Run the browser without a visible window.
    pub headless: bool,
    /// On fatal error, block indefinitely instead of exiting.
    pub pause_on_error: bool,
    /// Destination for the final files. Must exist; checked at run start.
    pub output_dir: PathBuf,
    /// Minimum days between runs (0 or less disables gating).
    pub period_days: i64,
    /// Log level filter string.
    pub log: String,
    /// Holds the driver binary, fetched archives, extracted files, and the
    /// run-state timestamp.
    pub data_dir: PathBuf,
    /// Package registry page listing the artifact releases.
    pub registry_url: String,
    /// Base URL the driver archives are served from.
    pub driver_base_url: String,
    /// Member filenames the artifact archive must yield.
    pub expected_files: Vec<String>,
    /// External fetch tool override (program + args with `{url}`/`{output}`
    /// placeholders). `None` probes PATH for a known tool.
    pub fetch_command: Option<Vec<String>>,
    /// Browser user-data directory bound to the session.
    pub user_data_dir: PathBuf,
    /// Browser profile folder name inside the user-data directory.
    pub profile_name: String,
}

impl Config {
    /// Build config from CLI/env args + optional TOML file.
    ///
    /// Priority (highest to lowest):
    ///   1. CLI / env, passed as `Some(value)` from clap
    ///   2. TOML file at `{data_dir}/config.toml`
    ///   3. Built-in defaults
    pub fn new(
        headless: bool,
        pause_on_error: bool,
        output_folder: Option<PathBuf>,
        period_days: Option<i64>,
        data_dir: Option<PathBuf>,
        log: Option<String>,
    ) -> Self {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);

        // Load TOML as the lowest-priority override layer
        let toml = load_toml(&data_dir).unwrap_or_default();

        // Presence flags can only be switched on, never off, by the file.
        let headless = headless || toml.headless.unwrap_or(false);
        let pause_on_error = pause_on_error || toml.pause_on_error.unwrap_or(false);

        let output_dir = output_folder
            .or(toml.output_folder)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
        let period_days = period_days.or(toml.period_days).unwrap_or(0);
        let log = log.or(toml.log).unwrap_or_else(|| "info".to_string());

        let registry_url = std::env::var("GEOIPUP_REGISTRY_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.registry_url)
            .unwrap_or_else(|| DEFAULT_REGISTRY_URL.to_string());

        let driver_base_url = std::env::var("GEOIPUP_DRIVER_BASE_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.driver_base_url)
            .unwrap_or_else(|| DEFAULT_DRIVER_BASE_URL.to_string());

        let expected_files = toml
            .expected_files
            .filter(|files| !files.is_empty())
            .unwrap_or_else(|| {
                DEFAULT_EXPECTED_FILES
                    .iter()
                    .map(|s| s.to_string())
                    .collect()
            });

        let fetch_command = toml.fetch_command;

        // The browser profile is pinned to the user's home, not configurable.
        let user_data_dir = default_user_data_dir();
        let profile_name = DEFAULT_PROFILE_NAME.to_string();

        Self {
            headless,
            pause_on_error,
            output_dir,
            period_days,
            log,
            data_dir,
            registry_url,
            driver_base_url,
            expected_files,
            fetch_command,
            user_data_dir,
            profile_name,
        }
    }

    /// Location of the cached driver binary.
    pub fn driver_path(&self) -> PathBuf {
        self.data_dir.join(DRIVER_FILE)
    }

    /// Where the fetched artifact archive is written.
    pub fn archive_path(&self) -> PathBuf {
        self.data_dir.join(ARCHIVE_NAME)
    }

    /// Fail fast when the configured output folder is absent.
    pub fn ensure_output_dir(&self) -> Result<(), UpdateError> {
        if self.output_dir.is_dir() {
            Ok(())
        } else {
            Err(UpdateError::OutputFolderMissing(self.output_dir.clone()))
        }
    }
}

fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        // ~/Library/Application Support/geoipup
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("geoipup");
        }
    }
    #[cfg(target_os = "linux")]
    {
        // $XDG_DATA_HOME/geoipup or ~/.local/share/geoipup
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join("geoipup");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("geoipup");
        }
    }
    #[cfg(target_os = "windows")]
    {
        // %APPDATA%\geoipup
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("geoipup");
        }
    }
    // Fallback
    PathBuf::from(".geoipup")
}

/// Edge's default profile root for the current OS user.
///
/// The session is bound to this directory plus a dedicated profile folder so
/// it reuses cookies and consent state from a profile set up by hand, without
/// fighting the user's everyday profile for the lock.
fn default_user_data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        // %LOCALAPPDATA%\Microsoft\Edge\User Data
        if let Ok(local) = std::env::var("LOCALAPPDATA") {
            return PathBuf::from(local)
                .join("Microsoft")
                .join("Edge")
                .join("User Data");
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("Microsoft Edge");
        }
    }
    #[cfg(target_os = "linux")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".config").join("microsoft-edge");
        }
    }
    // Fallback
    PathBuf::from(".edge-user-data")
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_when_nothing_configured() {
        let dir = TempDir::new().unwrap();
        let config = Config::new(false, false, None, None, Some(dir.path().to_path_buf()), None);

        assert!(!config.headless);
        assert!(!config.pause_on_error);
        assert_eq!(config.output_dir, PathBuf::from("."));
        assert_eq!(config.period_days, 0);
        assert_eq!(config.log, "info");
        assert_eq!(config.registry_url, DEFAULT_REGISTRY_URL);
        assert_eq!(config.driver_base_url, DEFAULT_DRIVER_BASE_URL);
        assert_eq!(config.expected_files, vec!["geoip", "geoip6"]);
        assert!(config.fetch_command.is_none());
        assert_eq!(config.profile_name, "Selenium");
    }

    #[test]
    fn test_toml_layer_applies_under_cli() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            r#"
                period_days = 9
                log = "debug"
                headless = true
                expected_files = ["geoip", "geoip6", "geoip-extra"]
                fetch_command = ["cp", "{url}", "{output}"]
                profile_name = "Automation"
            "#,
        )
        .unwrap();

        // CLI value wins over TOML for period_days; TOML fills the rest.
        let config = Config::new(
            false,
            false,
            None,
            Some(5),
            Some(dir.path().to_path_buf()),
            None,
        );

        assert_eq!(config.period_days, 5);
        assert_eq!(config.log, "debug");
        assert!(config.headless);
        assert_eq!(config.expected_files.len(), 3);
        assert_eq!(
            config.fetch_command.as_deref(),
            Some(&["cp".to_string(), "{url}".to_string(), "{output}".to_string()][..])
        );
        // The browser profile is pinned; the file cannot rebind it.
        assert_eq!(config.profile_name, "Selenium");
    }

    #[test]
    fn test_malformed_toml_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.toml"), "period_days = [not toml").unwrap();

        let config = Config::new(false, false, None, None, Some(dir.path().to_path_buf()), None);
        assert_eq!(config.period_days, 0);
        assert_eq!(config.log, "info");
    }

    #[test]
    fn test_paths_derive_from_data_dir() {
        let dir = TempDir::new().unwrap();
        let config = Config::new(false, false, None, None, Some(dir.path().to_path_buf()), None);

        assert_eq!(config.driver_path(), dir.path().join(DRIVER_FILE));
        assert_eq!(config.archive_path(), dir.path().join("geoip.zip"));
    }

    #[test]
    fn test_ensure_output_dir_rejects_missing_folder() {
        let dir = TempDir::new().unwrap();
        let mut config =
            Config::new(false, false, None, None, Some(dir.path().to_path_buf()), None);
        config.output_dir = dir.path().join("definitely-absent");

        let err = config.ensure_output_dir().unwrap_err();
        assert!(matches!(err, UpdateError::OutputFolderMissing(_)));

        config.output_dir = dir.path().to_path_buf();
        assert!(config.ensure_output_dir().is_ok());
    }
}
