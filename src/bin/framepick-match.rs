use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use std::io;
use std::path::PathBuf;
use std::process;
use std::time::Instant;

use framepick::MatchConfig;
use framepick::cli;
use framepick::core::device::DeviceProfiles;
use framepick::core::job;
use framepick::pipeline;

#[derive(Parser, Debug)]
#[command(
    name = "framepick-match",
    version,
    about = "Pick the harvested frame that best matches each screenshot",
    long_about = "Reads a JSON job list on stdin, crops each screenshot to its device's \
                  playback viewport, ranks the job's snapshots by structural similarity \
                  and writes the jobs that found a match, each collapsed to its best \
                  snapshot, to stdout."
)]
struct Cli {
    /// JSON file with match settings
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// JSON array of device profiles replacing the configured table
    #[arg(long, value_name = "FILE")]
    profiles: Option<PathBuf>,

    /// Maximum jobs matched concurrently
    #[arg(long)]
    threads: Option<usize>,

    /// Give up matching after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,
}

impl Cli {
    fn match_config(&self) -> Result<MatchConfig> {
        let mut config = match &self.config {
            Some(path) => MatchConfig::from_json_file(path)?,
            None => MatchConfig::default(),
        };
        if let Some(path) = &self.profiles {
            config.profiles = DeviceProfiles::from_json_file(path)
                .with_context(|| format!("Failed to load device profiles from {}", path.display()))?;
        }
        if self.threads.is_some() {
            config.threads = self.threads;
        }
        if self.timeout.is_some() {
            config.timeout_secs = self.timeout;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();
    cli::init_logging();

    let jobs = match cli::read_stdin_jobs() {
        Ok(jobs) => jobs,
        Err(e) => {
            eprintln!("error: {e}\n\n{}", Cli::command().render_usage());
            eprintln!("Pipe a JSON job list in, e.g. `framepick-match < jobs.json`");
            process::exit(2);
        }
    };

    let config = args.match_config()?;
    let token = config.cancellation_token();
    let start = Instant::now();

    let matched = pipeline::match_jobs(&jobs, &config, &token).context("Matching failed")?;
    log::info!(
        "Matched {} of {} job(s) in {:.2?}",
        matched.len(),
        jobs.len(),
        start.elapsed()
    );

    job::write_jobs(io::stdout().lock(), &matched).context("Failed to write job list")?;
    Ok(())
}
