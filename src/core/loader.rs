use image::RgbImage;
use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::cancel::CancellationToken;
use crate::core::fingerprint::{self, Fingerprint, FingerprintConfig, FingerprintError};
use crate::core::imaging::{self, FrameDecoder, FsDecoder};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Invalid working resolution: {0}")]
    Config(#[from] FingerprintError),

    #[error("Failed to start decode workers: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Operation cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub working_width: u32,
    pub working_height: u32,
    pub fingerprint: FingerprintConfig,
    /// Upper bound on concurrent decodes. Each worker holds one full-size
    /// frame until it is downsized, so this caps peak decode memory on top
    /// of the retained working images. `None` uses every available core.
    pub threads: Option<usize>,
}

impl LoaderConfig {
    /// Bytes held per loaded candidate until grouping finishes.
    pub fn working_image_bytes(&self) -> usize {
        self.working_width as usize * self.working_height as usize * 3
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            working_width: 320,
            working_height: 180,
            fingerprint: FingerprintConfig::default(),
            threads: None,
        }
    }
}

/// A decoded, downsized candidate frame and its signatures.
///
/// Owns the working image; it is released when the candidate is dropped.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub path: PathBuf,
    pub image: RgbImage,
    pub fingerprint: Fingerprint,
    pub corner_sum: u32,
}

impl Candidate {
    /// Build a candidate from an image already at the working resolution.
    pub fn from_working_image(path: PathBuf, image: RgbImage, config: &FingerprintConfig) -> Self {
        let fingerprint = Fingerprint::extract(&image, config);
        let corner_sum = fingerprint::corner_sum(&image);
        Self {
            path,
            image,
            fingerprint,
            corner_sum,
        }
    }
}

pub struct CandidateLoader<D: FrameDecoder = FsDecoder> {
    config: LoaderConfig,
    decoder: D,
    progress: Option<ProgressBar>,
    cancellation_token: CancellationToken,
}

impl CandidateLoader<FsDecoder> {
    pub fn new(config: LoaderConfig) -> Self {
        Self::with_decoder(config, FsDecoder)
    }
}

impl<D: FrameDecoder> CandidateLoader<D> {
    pub fn with_decoder(config: LoaderConfig, decoder: D) -> Self {
        Self {
            config,
            decoder,
            progress: None,
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Decode, downsize and fingerprint every distinct path once.
    ///
    /// Paths that fail to decode are dropped with a warning. Output order
    /// follows the first occurrence of each path in `paths`.
    pub fn load(&self, paths: &[PathBuf]) -> Result<Vec<Candidate>, LoadError> {
        self.config
            .fingerprint
            .validate(self.config.working_width, self.config.working_height)?;

        let unique = unique_paths(paths);
        if let Some(progress) = &self.progress {
            progress.set_length(unique.len() as u64);
        }

        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(threads) = self.config.threads {
            builder = builder.num_threads(threads.max(1));
        }
        let pool = builder.build()?;
        log::info!(
            "Decoding {} frame(s) on {} worker(s), retaining {} KiB each",
            unique.len(),
            pool.current_num_threads(),
            self.config.working_image_bytes() / 1024
        );

        let loaded: Vec<Option<Candidate>> = pool.install(|| {
            unique
                .par_iter()
                .map(|path| {
                    if self.cancellation_token.is_cancelled() {
                        return None;
                    }
                    let candidate = self.load_one(path);
                    if let Some(progress) = &self.progress {
                        progress.inc(1);
                    }
                    candidate
                })
                .collect()
        });

        if self.cancellation_token.is_cancelled() {
            return Err(LoadError::Cancelled);
        }

        let candidates: Vec<Candidate> = loaded.into_iter().flatten().collect();
        log::info!(
            "Loaded {} of {} candidate frame(s)",
            candidates.len(),
            unique.len()
        );
        Ok(candidates)
    }

    fn load_one(&self, path: &Path) -> Option<Candidate> {
        let decoded = match self.decoder.decode(path) {
            Ok(img) => img,
            Err(e) => {
                log::warn!("Dropping candidate {}: {}", path.display(), e);
                return None;
            }
        };
        let working = imaging::resize_exact(
            &decoded,
            self.config.working_width,
            self.config.working_height,
        );
        drop(decoded);

        log::debug!("Fingerprinted {}", path.display());
        Some(Candidate::from_working_image(
            path.to_path_buf(),
            working,
            &self.config.fingerprint,
        ))
    }
}

fn unique_paths(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    paths
        .iter()
        .filter(|p| seen.insert(p.as_path()))
        .cloned()
        .collect()
}
