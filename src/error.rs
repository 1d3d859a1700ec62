//! Error taxonomy for the update workflow.
//!
//! Every variant here is fatal: it unwinds to the top-level handler in
//! `main`, which prints the chain and exits 1. There are no in-run retries;
//! the retry unit is the next scheduled invocation.

use std::path::PathBuf;

use crate::browser::ClientError;

/// Conditions that abort a run.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    /// No usable browser installation was detected on this host.
    #[error("Microsoft Edge is not installed (probed {checked})")]
    BrowserNotInstalled { checked: String },

    /// The matching driver archive could not be fetched or unpacked.
    #[error("driver download failed from {url}: {reason}")]
    DriverDownloadFailed { url: String, reason: String },

    /// `--output-folder` points at a directory that does not exist.
    #[error("--output-folder does not exist: {}", .0.display())]
    OutputFolderMissing(PathBuf),

    /// Nothing on the package page matched the artifact naming pattern.
    #[error("download link not found at {url}")]
    LinkNotFound { url: String },

    /// The fetched archive is absent or unreadable, usually a failed fetch.
    #[error("cannot read fetched archive {}: {reason}", .path.display())]
    ArchiveFetchFailed { path: PathBuf, reason: String },

    /// An expected member was still missing after extraction.
    #[error("expected file '{0}' is not found")]
    MissingExpectedFile(String),

    /// The run was cut short by SIGINT/SIGTERM.
    #[error("interrupted by signal")]
    SignalInterrupt,

    /// Transport or protocol failure inside the browser session.
    #[error("browser session: {0}")]
    Session(#[from] ClientError),
}
