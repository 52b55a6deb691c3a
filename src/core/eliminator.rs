use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::grouping::DuplicateGroup;

/// A duplicate whose backing file could not be removed.
#[derive(Debug, Error)]
#[error("Failed to delete {}: {source}", .path.display())]
pub struct DeletionFailure {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// One line of the elimination history file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EliminationRecord {
    pub timestamp: String,
    pub retained: String,
    pub removed: Vec<String>,
    pub action: String, // "deleted" or "dry-run"
}

#[derive(Debug, Default)]
pub struct EliminationReport {
    /// One path per group, in group order.
    pub survivors: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
    pub failures: Vec<DeletionFailure>,
    pub history_errors: Vec<String>,
}

/// Keeps the first member of each group and deletes the rest.
#[derive(Debug, Clone, Default)]
pub struct DuplicateEliminator {
    dry_run: bool,
    history_file: Option<PathBuf>,
}

impl DuplicateEliminator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report what would be removed without touching the filesystem.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Append one JSON line per culled group to `path`.
    pub fn with_history(mut self, path: PathBuf) -> Self {
        self.history_file = Some(path);
        self
    }

    /// Consume finalized groups. Decoded images are released as each group is handled.
    pub fn eliminate(&self, groups: Vec<DuplicateGroup>) -> EliminationReport {
        let mut report = EliminationReport::default();

        for group in groups {
            let retained = group.representative().path.clone();
            let mut removed_here = Vec::new();

            for dup in group.duplicates() {
                if dup.path == retained {
                    continue;
                }
                if self.dry_run {
                    log::info!("[dry-run] would delete {}", dup.path.display());
                    removed_here.push(dup.path.clone());
                    continue;
                }
                match fs::remove_file(&dup.path) {
                    Ok(()) => {
                        log::debug!("Deleted {}", dup.path.display());
                        removed_here.push(dup.path.clone());
                    }
                    Err(source) => {
                        let failure = DeletionFailure {
                            path: dup.path.clone(),
                            source,
                        };
                        log::warn!("{}", failure);
                        report.failures.push(failure);
                    }
                }
            }

            if !removed_here.is_empty() {
                if let Err(e) = self.record_history(&retained, &removed_here) {
                    log::warn!("Could not record elimination history: {}", e);
                    report.history_errors.push(e.to_string());
                }
            }

            report.removed.extend(removed_here);
            report.survivors.push(retained);
        }

        log::info!(
            "Kept {} frame(s), removed {}, {} deletion failure(s)",
            report.survivors.len(),
            report.removed.len(),
            report.failures.len()
        );
        report
    }

    fn record_history(&self, retained: &Path, removed: &[PathBuf]) -> std::io::Result<()> {
        let Some(history_file) = &self.history_file else {
            return Ok(());
        };
        let record = EliminationRecord {
            timestamp: Utc::now().to_rfc3339(),
            retained: retained.to_string_lossy().into_owned(),
            removed: removed
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
            action: if self.dry_run { "dry-run" } else { "deleted" }.to_string(),
        };
        let mut out = OpenOptions::new()
            .create(true)
            .append(true)
            .open(history_file)?;
        writeln!(out, "{}", serde_json::to_string(&record)?)?;
        Ok(())
    }
}
