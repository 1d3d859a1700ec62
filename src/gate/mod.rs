//! Interval gating on a persisted last-run timestamp.
//!
//! The state file holds a single RFC 3339 UTC line. It is rewritten the
//! moment a run is approved, before any network activity, so a run that
//! later fails still counts against the period: at most one attempt per
//! period, not at least one.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Name of the persisted timestamp file inside the data directory.
pub const STATE_FILE: &str = "TimeStamp.txt";

/// Outcome of the pure gating decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether this invocation should proceed.
    pub proceed: bool,
    /// Timestamp to persist before proceeding, when gating is active.
    pub record: Option<DateTime<Utc>>,
}

/// Decide whether a run is due.
///
/// * `min_days <= 0`: gating disabled, always proceed, never record.
/// * No saved timestamp: proceed and record `now`.
/// * `min_days` or more whole days elapsed: proceed and record `now`.
/// * Otherwise: skip.
pub fn should_run(last: Option<DateTime<Utc>>, min_days: i64, now: DateTime<Utc>) -> Decision {
    if min_days <= 0 {
        return Decision {
            proceed: true,
            record: None,
        };
    }
    match last {
        None => Decision {
            proceed: true,
            record: Some(now),
        },
        Some(saved) => {
            if now.signed_duration_since(saved).num_days() >= min_days {
                Decision {
                    proceed: true,
                    record: Some(now),
                }
            } else {
                Decision {
                    proceed: false,
                    record: None,
                }
            }
        }
    }
}

/// Apply the gate against the state file in `data_dir`.
///
/// Returns whether the run should proceed. When it should, the new timestamp
/// is already written by the time this returns. With gating disabled
/// (`min_days <= 0`) the state file is neither read nor written.
pub fn check_and_record(data_dir: &Path, min_days: i64, now: DateTime<Utc>) -> Result<bool> {
    if min_days <= 0 {
        return Ok(true);
    }

    let path = state_path(data_dir);
    let last = read_state(&path);
    let decision = should_run(last, min_days, now);

    if let Some(ts) = decision.record {
        write_state(&path, ts)?;
    }

    if decision.proceed && last.is_some() {
        println!("{min_days} or more days have passed since the saved date.");
    } else if !decision.proceed {
        debug!(min_days, "interval has not elapsed, skipping this run");
    }

    Ok(decision.proceed)
}

fn state_path(data_dir: &Path) -> PathBuf {
    data_dir.join(STATE_FILE)
}

/// Read the saved timestamp; `None` when the file is absent or unparseable.
fn read_state(path: &Path) -> Option<DateTime<Utc>> {
    let content = std::fs::read_to_string(path).ok()?;
    let line = content.lines().next()?.trim();
    match DateTime::parse_from_rfc3339(line) {
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(_) => {
            debug!(path = %path.display(), "unreadable timestamp in state file, treating as absent");
            None
        }
    }
}

fn write_state(path: &Path, ts: DateTime<Utc>) -> Result<()> {
    std::fs::write(path, format!("{}\n", ts.to_rfc3339()))
        .with_context(|| format!("failed to write {}", path.display()))
}

// ─── Tests ────────────────────────────────────────────────────────────────────
