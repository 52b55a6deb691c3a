use image::RgbImage;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::cancel::CancellationToken;
use crate::core::device::{CandidateNormalization, DeviceProfile, DeviceProfiles};
use crate::core::imaging::{self, FrameDecoder, FsDecoder, StructuralSimilarity, WindowedSsim};

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("Failed to start match workers: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Operation cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoredCandidate {
    pub path: PathBuf,
    /// 0 to 100; always 0 when `comparable` is false.
    pub score: u8,
    /// Whether the normalised candidate had the cropped screenshot's dimensions.
    pub comparable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchOutcome {
    pub path: PathBuf,
    pub score: u8,
    pub profile: String,
    /// Every scored candidate, comparable ones first, then by score;
    /// equal scores keep input order.
    pub ranking: Vec<ScoredCandidate>,
}

pub struct CandidateMatcher<D: FrameDecoder = FsDecoder, S: StructuralSimilarity = WindowedSsim> {
    profiles: DeviceProfiles,
    decoder: D,
    similarity: S,
    cancellation_token: CancellationToken,
}

impl CandidateMatcher {
    pub fn new(profiles: DeviceProfiles) -> Self {
        Self::with_parts(profiles, FsDecoder, WindowedSsim::default())
    }
}

impl<D: FrameDecoder, S: StructuralSimilarity> CandidateMatcher<D, S> {
    pub fn with_parts(profiles: DeviceProfiles, decoder: D, similarity: S) -> Self {
        Self {
            profiles,
            decoder,
            similarity,
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    pub fn profiles(&self) -> &DeviceProfiles {
        &self.profiles
    }

    /// Pick the candidate that best matches the screenshot at `original`.
    ///
    /// Returns `Ok(None)` when the screenshot cannot be decoded, its
    /// resolution has no device profile, or no candidate could be compared.
    /// A comparable candidate wins even with a score of 0.
    pub fn best_match(
        &self,
        original: &Path,
        candidates: &[PathBuf],
    ) -> Result<Option<MatchOutcome>, MatchError> {
        self.check_cancelled()?;

        let Some((profile, reference)) = self.prepare_reference(original) else {
            return Ok(None);
        };

        let mut ranking = Vec::with_capacity(candidates.len());
        for path in candidates {
            self.check_cancelled()?;
            let Some(normalized) = self.normalize_candidate(path, profile) else {
                continue;
            };
            let comparable = normalized.dimensions() == reference.dimensions();
            let score = self.score(&reference, &normalized);
            log::debug!("{} scored {} against {}", path.display(), score, original.display());
            ranking.push(ScoredCandidate {
                path: path.clone(),
                score,
                comparable,
            });
        }

        if !ranking.iter().any(|c| c.comparable) {
            log::info!("No comparable candidate for {}", original.display());
            return Ok(None);
        }

        // Comparable candidates outrank mismatched ones at any score.
        // Stable: ties keep input order.
        ranking.sort_by(|a, b| (b.comparable, b.score).cmp(&(a.comparable, a.score)));
        let best = &ranking[0];
        Ok(Some(MatchOutcome {
            path: best.path.clone(),
            score: best.score,
            profile: profile.name.clone(),
            ranking,
        }))
    }

    /// Similarity scaled to 0..=100; differently sized images score 0.
    pub fn score(&self, reference: &RgbImage, candidate: &RgbImage) -> u8 {
        if reference.dimensions() != candidate.dimensions() {
            return 0;
        }
        self.similarity
            .similarity(reference, candidate)
            .map(|s| (s * 100.0).round().clamp(0.0, 100.0) as u8)
            .unwrap_or(0)
    }

    fn check_cancelled(&self) -> Result<(), MatchError> {
        if self.cancellation_token.is_cancelled() {
            return Err(MatchError::Cancelled);
        }
        Ok(())
    }

    fn prepare_reference(&self, original: &Path) -> Option<(&DeviceProfile, RgbImage)> {
        let decoded = match self.decoder.decode(original) {
            Ok(img) => img,
            Err(e) => {
                log::warn!("Skipping screenshot {}: {}", original.display(), e);
                return None;
            }
        };
        let (width, height) = decoded.dimensions();
        let Some(profile) = self.profiles.detect(width, height) else {
            log::info!(
                "No device profile for {} ({}x{})",
                original.display(),
                width,
                height
            );
            return None;
        };
        let cropped = imaging::crop(&decoded, profile.viewport)?;
        Some((profile, cropped))
    }

    fn normalize_candidate(&self, path: &Path, profile: &DeviceProfile) -> Option<RgbImage> {
        let decoded = match self.decoder.decode(path) {
            Ok(img) => img,
            Err(e) => {
                log::warn!("Skipping candidate {}: {}", path.display(), e);
                return None;
            }
        };
        match profile.candidates {
            CandidateNormalization::Direct => Some(decoded),
            CandidateNormalization::ResizeThenCrop => {
                let native = imaging::resize_exact(&decoded, profile.width, profile.height);
                drop(decoded);
                imaging::crop(&native, profile.viewport)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::device::Rect;
    use image::{ImageBuffer, Rgb};
    use tempfile::TempDir;

    fn pattern(width: u32, height: u32, seed: u32) -> RgbImage {
        ImageBuffer::from_fn(width, height, |x, y| {
            let v = ((x / 7 + y / 5 + seed) * 37 % 256) as u8;
            Rgb([v, v.wrapping_add(seed as u8), 255 - v])
        })
    }

    fn direct_profiles() -> DeviceProfiles {
        DeviceProfiles::new(vec![DeviceProfile {
            name: "test".to_string(),
            width: 100,
            height: 80,
            viewport: Rect::new(0, 10, 100, 60),
            candidates: CandidateNormalization::Direct,
        }])
        .unwrap()
    }

    struct ConstantSimilarity(f64);

    impl StructuralSimilarity for ConstantSimilarity {
        fn similarity(&self, a: &RgbImage, b: &RgbImage) -> Option<f64> {
            (a.dimensions() == b.dimensions()).then_some(self.0)
        }
    }

    #[test]
    fn test_ipad_screenshot_matches_identical_frame() {
        let temp_dir = TempDir::new().unwrap();
        let original = temp_dir.path().join("shot.png");
        let screenshot = pattern(2048, 1536, 1);
        screenshot.save(&original).unwrap();

        let same = temp_dir.path().join("same.png");
        screenshot.save(&same).unwrap();
        let other = temp_dir.path().join("other.png");
        pattern(1024, 768, 9).save(&other).unwrap();

        let matcher = CandidateMatcher::new(DeviceProfiles::builtin());
        let outcome = matcher
            .best_match(&original, &[other.clone(), same.clone()])
            .unwrap()
            .unwrap();

        assert_eq!(outcome.path, same);
        assert_eq!(outcome.profile, "ipad");
        assert!(outcome.score >= 99, "score {}", outcome.score);
        assert_eq!(outcome.ranking.len(), 2);
        assert!(outcome.ranking[1].score < outcome.score);
    }

    #[test]
    fn test_mismatched_dimensions_score_zero_and_never_win() {
        let temp_dir = TempDir::new().unwrap();
        let screenshot = pattern(100, 80, 3);
        let original = temp_dir.path().join("shot.png");
        screenshot.save(&original).unwrap();

        let viewport = imaging::crop(&screenshot, Rect::new(0, 10, 100, 60)).unwrap();
        let exact = temp_dir.path().join("exact.png");
        viewport.save(&exact).unwrap();
        let too_tall = temp_dir.path().join("tall.png");
        pattern(100, 61, 3).save(&too_tall).unwrap();
        let uncropped = temp_dir.path().join("uncropped.png");
        screenshot.save(&uncropped).unwrap();

        let matcher = CandidateMatcher::new(direct_profiles());
        let outcome = matcher
            .best_match(&original, &[too_tall.clone(), uncropped.clone(), exact.clone()])
            .unwrap()
            .unwrap();

        assert_eq!(outcome.path, exact);
        assert_eq!(outcome.score, 100);
        for scored in &outcome.ranking[1..] {
            assert!(!scored.comparable);
            assert_eq!(scored.score, 0);
        }
    }

    #[test]
    fn test_zero_scoring_comparable_candidate_beats_earlier_mismatch() {
        let temp_dir = TempDir::new().unwrap();
        let original = temp_dir.path().join("shot.png");
        RgbImage::from_pixel(100, 80, Rgb([255, 255, 255])).save(&original).unwrap();
        let wrong = temp_dir.path().join("wrong.png");
        RgbImage::from_pixel(50, 50, Rgb([255, 255, 255])).save(&wrong).unwrap();
        let valid = temp_dir.path().join("valid.png");
        RgbImage::from_pixel(100, 60, Rgb([0, 0, 0])).save(&valid).unwrap();

        let matcher =
            CandidateMatcher::with_parts(direct_profiles(), FsDecoder, ConstantSimilarity(0.0));
        let outcome = matcher
            .best_match(&original, &[wrong.clone(), valid.clone()])
            .unwrap()
            .unwrap();

        assert_eq!(outcome.path, valid);
        assert_eq!(outcome.score, 0);
        assert!(outcome.ranking[0].comparable);
        assert_eq!(outcome.ranking[1].path, wrong);
        assert!(!outcome.ranking[1].comparable);
    }

    #[test]
    fn test_only_mismatched_candidates_is_no_match() {
        let temp_dir = TempDir::new().unwrap();
        let original = temp_dir.path().join("shot.png");
        pattern(100, 80, 0).save(&original).unwrap();
        let wrong = temp_dir.path().join("wrong.png");
        pattern(50, 50, 0).save(&wrong).unwrap();

        let matcher = CandidateMatcher::new(direct_profiles());
        assert_eq!(matcher.best_match(&original, &[wrong]).unwrap(), None);
    }

    #[test]
    fn test_unknown_device_yields_no_match() {
        let temp_dir = TempDir::new().unwrap();
        let original = temp_dir.path().join("shot.png");
        pattern(101, 80, 0).save(&original).unwrap();
        let candidate = temp_dir.path().join("c.png");
        pattern(100, 60, 0).save(&candidate).unwrap();

        let matcher = CandidateMatcher::new(direct_profiles());
        assert_eq!(matcher.best_match(&original, &[candidate]).unwrap(), None);
    }

    #[test]
    fn test_unreadable_inputs_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let original = temp_dir.path().join("shot.png");
        let screenshot = pattern(100, 80, 2);
        screenshot.save(&original).unwrap();
        let good = temp_dir.path().join("good.png");
        imaging::crop(&screenshot, Rect::new(0, 10, 100, 60))
            .unwrap()
            .save(&good)
            .unwrap();
        let corrupt = temp_dir.path().join("corrupt.png");
        std::fs::write(&corrupt, b"garbage").unwrap();
        let missing = temp_dir.path().join("missing.png");

        let matcher = CandidateMatcher::new(direct_profiles());
        let outcome = matcher
            .best_match(&original, &[corrupt, missing.clone(), good.clone()])
            .unwrap()
            .unwrap();
        assert_eq!(outcome.path, good);
        assert_eq!(outcome.ranking.len(), 1);

        assert_eq!(matcher.best_match(&missing, &[good]).unwrap(), None);
    }

    #[test]
    fn test_ties_resolve_to_first_candidate() {
        let temp_dir = TempDir::new().unwrap();
        let original = temp_dir.path().join("shot.png");
        pattern(100, 80, 0).save(&original).unwrap();
        let paths: Vec<PathBuf> = (0..4)
            .map(|i| {
                let path = temp_dir.path().join(format!("{i}.png"));
                pattern(100, 60, i).save(&path).unwrap();
                path
            })
            .collect();

        let matcher =
            CandidateMatcher::with_parts(direct_profiles(), FsDecoder, ConstantSimilarity(0.5));
        let outcome = matcher.best_match(&original, &paths).unwrap().unwrap();

        assert_eq!(outcome.path, paths[0]);
        assert_eq!(outcome.score, 50);
        let order: Vec<_> = outcome.ranking.iter().map(|c| c.path.clone()).collect();
        assert_eq!(order, paths);
    }

    #[test]
    fn test_resize_then_crop_normalizes_smaller_frames() {
        let temp_dir = TempDir::new().unwrap();
        let profiles = DeviceProfiles::new(vec![DeviceProfile {
            name: "scaled".to_string(),
            width: 120,
            height: 90,
            viewport: Rect::new(0, 15, 120, 60),
            candidates: CandidateNormalization::ResizeThenCrop,
        }])
        .unwrap();

        let original = temp_dir.path().join("shot.png");
        let flat: RgbImage = ImageBuffer::from_pixel(120, 90, Rgb([90, 140, 200]));
        flat.save(&original).unwrap();
        let half = temp_dir.path().join("half.png");
        ImageBuffer::from_pixel(60, 45, Rgb([90u8, 140, 200]))
            .save(&half)
            .unwrap();

        let outcome = CandidateMatcher::new(profiles)
            .best_match(&original, &[half.clone()])
            .unwrap()
            .unwrap();
        assert_eq!(outcome.path, half);
        assert_eq!(outcome.score, 100);
        assert!(outcome.ranking[0].comparable);
    }

    #[test]
    fn test_cancelled_matcher_returns_error() {
        let token = CancellationToken::new();
        token.cancel();
        let matcher = CandidateMatcher::new(direct_profiles()).with_cancellation(token);
        assert!(matches!(
            matcher.best_match(Path::new("shot.png"), &[]),
            Err(MatchError::Cancelled)
        ));
    }
}
