//! Fetch, extract, verify, install.
//!
//! The artifact archive is fetched by an external tool whose output streams
//! to the console. Success is judged by what lands on disk, not by the
//! tool's exit status. Expected members are extracted into the work
//! directory and copied to the output folder only once all of them exist,
//! so a failed run never overwrites a previous good install.

use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::UpdateError;
use crate::locator::ArtifactLink;

/// Known fetch tools, probed in order. `{url}` and `{output}` are filled in
/// per invocation.
const FETCH_CANDIDATES: &[(&str, &[&str])] = &[
    ("curl", &["-L", "--fail", "-o", "{output}", "{url}"]),
    ("wget", &["-O", "{output}", "{url}"]),
];

/// An external download tool resolved to a concrete command line.
pub struct Fetcher {
    program: String,
    args: Vec<String>,
}

impl Fetcher {
    /// Pick the fetch tool: the configured override when present, otherwise
    /// the first known candidate found on PATH.
    pub fn resolve(config: &Config) -> Result<Self> {
        if let Some(custom) = &config.fetch_command {
            let (program, args) = custom
                .split_first()
                .context("fetch_command must name a program")?;
            return Ok(Self {
                program: program.clone(),
                args: args.to_vec(),
            });
        }
        for &(program, args) in FETCH_CANDIDATES {
            if on_path(program) {
                debug!(program, "fetch tool selected");
                return Ok(Self {
                    program: program.to_string(),
                    args: args.iter().map(|a| (*a).to_string()).collect(),
                });
            }
        }
        anyhow::bail!("no fetch tool found on PATH (tried curl, wget)")
    }

    /// Run the fetch tool, streaming its stdout and stderr to the console.
    ///
    /// Both streams are drained by their own tasks, and both drainers are
    /// joined before the child is reaped. A non-zero exit is logged but not
    /// fatal; whether the archive arrived is checked on disk afterwards.
    pub async fn fetch(&self, url: &str, output: &Path) -> Result<()> {
        let output_arg = output.display().to_string();
        let args: Vec<String> = self
            .args
            .iter()
            .map(|a| a.replace("{url}", url).replace("{output}", &output_arg))
            .collect();

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.program))?;

        let stdout = child.stdout.take().context("fetch stdout not captured")?;
        let stderr = child.stderr.take().context("fetch stderr not captured")?;
        let out_task = tokio::spawn(drain(stdout));
        let err_task = tokio::spawn(drain(stderr));

        let _ = out_task.await;
        let _ = err_task.await;
        let status = child
            .wait()
            .await
            .with_context(|| format!("{} did not run", self.program))?;
        if !status.success() {
            warn!(%status, program = %self.program, "fetch tool exited non-zero");
        }
        Ok(())
    }
}

/// Fetch the artifact and install the expected database files.
pub async fn run(config: &Config, link: &ArtifactLink) -> Result<()> {
    let archive = config.archive_path();
    let fetcher = Fetcher::resolve(config)?;
    fetcher.fetch(&link.url, &archive).await?;

    clean_stale(&config.data_dir, &config.expected_files)?;
    extract_expected(&archive, &config.expected_files, &config.data_dir)?;
    verify_complete(&config.data_dir, &config.expected_files)?;
    install(&config.data_dir, &config.output_dir, &config.expected_files)?;

    info!(
        files = config.expected_files.len(),
        dest = %config.output_dir.display(),
        "database files installed"
    );
    Ok(())
}

async fn drain(stream: impl AsyncRead + Unpin) {
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        println!("{line}");
    }
}

fn on_path(program: &str) -> bool {
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| {
        dir.join(program).is_file()
            || (cfg!(windows) && dir.join(format!("{program}.exe")).is_file())
    })
}

/// Remove leftovers from a previous run so a stale copy can never satisfy
/// the completeness check.
fn clean_stale(work_dir: &Path, expected: &[String]) -> Result<()> {
    for name in expected {
        let path = work_dir.join(name);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("cannot remove stale {}", path.display()))?;
            debug!(path = %path.display(), "removed stale file");
        }
    }
    Ok(())
}

/// Extract only the expected members into `dest`, echoing a listing with
/// each file's modification date. Members absent from the archive are
/// skipped here and caught by the completeness check.
fn extract_expected(archive: &Path, expected: &[String], dest: &Path) -> Result<()> {
    let file = std::fs::File::open(archive).map_err(|e| UpdateError::ArchiveFetchFailed {
        path: archive.to_path_buf(),
        reason: e.to_string(),
    })?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| UpdateError::ArchiveFetchFailed {
        path: archive.to_path_buf(),
        reason: e.to_string(),
    })?;

    let pad = expected.iter().map(|n| n.len()).max().unwrap_or(0) + 1;
    for name in expected {
        let mut entry = match zip.by_name(name) {
            Ok(entry) => entry,
            Err(zip::result::ZipError::FileNotFound) => continue,
            Err(e) => {
                return Err(UpdateError::ArchiveFetchFailed {
                    path: archive.to_path_buf(),
                    reason: e.to_string(),
                }
                .into())
            }
        };
        let target = dest.join(name);
        let mut out = std::fs::File::create(&target)
            .with_context(|| format!("cannot create {}", target.display()))?;
        std::io::copy(&mut entry, &mut out)
            .with_context(|| format!("cannot extract {name}"))?;
        drop(out);
        println!("{name:<pad$}{}", modified_stamp(&target));
    }
    Ok(())
}

/// Every expected file must exist in the work directory.
fn verify_complete(work_dir: &Path, expected: &[String]) -> Result<(), UpdateError> {
    for name in expected {
        if !work_dir.join(name).is_file() {
            return Err(UpdateError::MissingExpectedFile(name.clone()));
        }
    }
    Ok(())
}

/// Copy the verified files into the output folder.
fn install(work_dir: &Path, output_dir: &Path, expected: &[String]) -> Result<()> {
    if same_dir(work_dir, output_dir) {
        debug!("output folder is the work directory, nothing to copy");
        return Ok(());
    }
    for name in expected {
        let from = work_dir.join(name);
        let to = output_dir.join(name);
        std::fs::copy(&from, &to)
            .with_context(|| format!("cannot copy {name} to {}", output_dir.display()))?;
    }
    Ok(())
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn modified_stamp(path: &Path) -> String {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(|t| DateTime::<Local>::from(t).format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

// ─── Tests ────────────────────────────────────────────────────────────────────
