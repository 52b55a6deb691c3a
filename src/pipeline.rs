//! Job-level orchestration of the deduplication and matching stages.

use indicatif::ProgressBar;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::PathBuf;

use crate::config::{DedupConfig, MatchConfig};
use crate::core::cancel::CancellationToken;
use crate::core::eliminator::{DuplicateEliminator, EliminationReport};
use crate::core::grouping::DuplicateGrouper;
use crate::core::imaging::{FsDecoder, WindowedSsim};
use crate::core::job::Job;
use crate::core::loader::{CandidateLoader, LoadError};
use crate::core::matcher::{CandidateMatcher, MatchError};

#[derive(Debug)]
pub struct DedupRun {
    /// Every input job, snapshots pruned to surviving frames.
    pub jobs: Vec<Job>,
    pub report: EliminationReport,
}

/// Fingerprint every snapshot across `jobs`, delete duplicates and prune the jobs.
///
/// Deletion only starts after the complete candidate set has been grouped.
/// Snapshots that failed to decode are not survivors and are pruned as well.
pub fn dedup_jobs(
    jobs: &[Job],
    config: &DedupConfig,
    cancellation_token: &CancellationToken,
    progress: Option<ProgressBar>,
) -> Result<DedupRun, LoadError> {
    let paths: Vec<PathBuf> = jobs
        .iter()
        .flat_map(|job| job.snapshots.iter().cloned())
        .collect();

    let mut loader = CandidateLoader::new(config.loader).with_cancellation(cancellation_token.clone());
    if let Some(progress) = progress {
        loader = loader.with_progress(progress);
    }
    let candidates = loader.load(&paths)?;

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let groups = DuplicateGrouper::new(config.grouping).group(candidates, &mut rng);

    let mut eliminator = DuplicateEliminator::new().dry_run(config.dry_run);
    if let Some(history) = &config.history_file {
        eliminator = eliminator.with_history(history.clone());
    }
    let report = eliminator.eliminate(groups);

    let survivors: HashSet<PathBuf> = report.survivors.iter().cloned().collect();
    let jobs = jobs.iter().map(|job| job.pruned_to(&survivors)).collect();
    Ok(DedupRun { jobs, report })
}

/// Collapse each job to its best snapshot. Jobs without a match are omitted.
pub fn match_jobs(
    jobs: &[Job],
    config: &MatchConfig,
    cancellation_token: &CancellationToken,
) -> Result<Vec<Job>, MatchError> {
    let matcher = CandidateMatcher::with_parts(
        config.profiles.clone(),
        FsDecoder,
        WindowedSsim::new(config.ssim_window),
    )
    .with_cancellation(cancellation_token.clone());

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(threads) = config.threads {
        builder = builder.num_threads(threads.max(1));
    }
    let pool = builder.build()?;

    let matched: Vec<Option<Job>> = pool.install(|| {
        jobs.par_iter()
            .map(|job| -> Result<Option<Job>, MatchError> {
                let outcome = matcher.best_match(&job.original, &job.snapshots)?;
                Ok(outcome.map(|best| job.collapsed_to(&best.path, best.score)))
            })
            .collect::<Result<_, MatchError>>()
    })?;

    let matched: Vec<Job> = matched.into_iter().flatten().collect();
    log::info!("Matched {} of {} job(s)", matched.len(), jobs.len());
    Ok(matched)
}
