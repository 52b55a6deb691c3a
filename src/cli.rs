//! Plumbing shared by the two driver binaries: stdin job lists, logging, progress.

use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, IsTerminal, Read};
use std::time::Duration;
use thiserror::Error;

use crate::core::job::{self, Job};

#[derive(Debug, Error)]
pub enum InputError {
    #[error("No job list on standard input")]
    Absent,

    #[error("Standard input was empty")]
    Empty,

    #[error("Failed to read standard input: {0}")]
    Io(#[from] io::Error),

    #[error("Standard input is not a valid job list: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Log to stderr; stdout carries the job list. `RUST_LOG` overrides the level.
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .target(env_logger::Target::Stderr)
        .init();
}

/// Read a job list from stdin, refusing an interactive terminal.
pub fn read_stdin_jobs() -> Result<Vec<Job>, InputError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Err(InputError::Absent);
    }
    read_job_list(stdin.lock())
}

pub fn read_job_list<R: Read>(mut reader: R) -> Result<Vec<Job>, InputError> {
    let mut content = String::new();
    reader.read_to_string(&mut content)?;
    if content.trim().is_empty() {
        return Err(InputError::Empty);
    }
    Ok(job::read_jobs(content.as_bytes())?)
}

/// A counted bar on stderr, hidden automatically when stderr is not a terminal.
pub fn progress_bar(message: &'static str) -> ProgressBar {
    let bar = ProgressBar::new(0);
    let style = ProgressStyle::with_template("{spinner:.green} {msg} [{bar:30.cyan/blue}] {pos}/{len}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}
