use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, ValueEnum};
use std::io;
use std::path::PathBuf;
use std::process;
use std::time::Instant;

use framepick::cli;
use framepick::core::grouping::GroupingStrategy;
use framepick::core::job;
use framepick::pipeline;
use framepick::DedupConfig;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Strategy {
    /// Compare against each group's first member
    Sampled,
    /// Sort by corner sum and split on gaps
    Buckets,
}

#[derive(Parser, Debug)]
#[command(
    name = "framepick-dedup",
    version,
    about = "Delete near-identical harvested frames and prune the job list",
    long_about = "Reads a JSON job list on stdin, fingerprints every snapshot, keeps one \
                  frame per group of duplicates, deletes the rest and writes the pruned \
                  job list to stdout."
)]
struct Cli {
    /// JSON file with dedup settings
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Grouping strategy (overrides the config file)
    #[arg(long, value_enum)]
    strategy: Option<Strategy>,

    /// Only report what would be deleted
    #[arg(long)]
    dry_run: bool,

    /// Append a JSON line per culled group to this file
    #[arg(long, value_name = "FILE")]
    history: Option<PathBuf>,

    /// Maximum concurrent decodes
    #[arg(long)]
    threads: Option<usize>,

    /// Give up fingerprinting after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,
}

impl Cli {
    fn dedup_config(&self) -> Result<DedupConfig> {
        let mut config = match &self.config {
            Some(path) => DedupConfig::from_json_file(path)?,
            None => DedupConfig::default(),
        };
        match self.strategy {
            Some(Strategy::Sampled) if !matches!(config.grouping, GroupingStrategy::Sampled { .. }) => {
                config.grouping = GroupingStrategy::default();
            }
            Some(Strategy::Buckets) if !matches!(config.grouping, GroupingStrategy::SortedBuckets { .. }) => {
                config.grouping = GroupingStrategy::sorted_buckets();
            }
            _ => {}
        }
        config.dry_run |= self.dry_run;
        if self.history.is_some() {
            config.history_file = self.history.clone();
        }
        if self.threads.is_some() {
            config.loader.threads = self.threads;
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
            eprintln!("Pipe a JSON job list in, e.g. `framepick-dedup < jobs.json`");
            process::exit(2);
        }
    };

    let config = args.dedup_config()?;
    let token = config.cancellation_token();
    let start = Instant::now();

    let progress = cli::progress_bar("Fingerprinting");
    let run = pipeline::dedup_jobs(&jobs, &config, &token, Some(progress.clone()))
        .context("Deduplication failed")?;
    progress.finish_and_clear();

    for failure in &run.report.failures {
        eprintln!("⚠️  {failure}");
    }
    log::info!(
        "Kept {} frame(s), removed {} in {:.2?}",
        run.report.survivors.len(),
        run.report.removed.len(),
        start.elapsed()
    );

    job::write_jobs(io::stdout().lock(), &run.jobs).context("Failed to write job list")?;
    Ok(())
}
