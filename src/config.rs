use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::core::cancel::CancellationToken;
use crate::core::device::{DeviceProfiles, ProfileError};
use crate::core::grouping::GroupingStrategy;
use crate::core::loader::LoaderConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Profiles(#[from] ProfileError),
}

/// Settings for the deduplication stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub loader: LoaderConfig,
    pub grouping: GroupingStrategy,
    /// Seed for pixel sampling; fixed so reruns group identically.
    pub seed: u64,
    pub dry_run: bool,
    pub history_file: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            loader: LoaderConfig::default(),
            grouping: GroupingStrategy::default(),
            seed: 0x5eed,
            dry_run: false,
            history_file: None,
            timeout_secs: None,
        }
    }
}

impl DedupConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        read_json(path)
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        token_for(self.timeout_secs)
    }
}

/// Settings for the matching stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    pub profiles: DeviceProfiles,
    /// Side of the square SSIM window, in pixels.
    pub ssim_window: u32,
    /// Upper bound on jobs matched concurrently; `None` uses every core.
    pub threads: Option<usize>,
    pub timeout_secs: Option<u64>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            profiles: DeviceProfiles::builtin(),
            ssim_window: 8,
            threads: None,
            timeout_secs: None,
        }
    }
}

impl MatchConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let config: Self = read_json(path)?;
        config.profiles.validate()?;
        Ok(config)
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        token_for(self.timeout_secs)
    }
}

fn token_for(timeout_secs: Option<u64>) -> CancellationToken {
    match timeout_secs {
        Some(secs) => CancellationToken::new().with_timeout(Duration::from_secs(secs)),
        None => CancellationToken::new(),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::grouping::SimilarityTest;
    use crate::core::macroblock::BlockComparison;
    use tempfile::TempDir;

    #[test]
    fn test_partial_dedup_config_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("dedup.json");
        fs::write(
            &path,
            r#"{"grouping": {"strategy": "sorted_buckets", "epsilon": 20}, "loader": {"threads": 2}}"#,
        )
        .unwrap();

        let config = DedupConfig::from_json_file(&path).unwrap();
        assert_eq!(config.grouping, GroupingStrategy::SortedBuckets { epsilon: 20 });
        assert_eq!(config.loader.threads, Some(2));
        assert_eq!(config.loader.working_width, 320);
        assert_eq!(config.seed, DedupConfig::default().seed);
    }

    #[test]
    fn test_sampled_strategy_round_trips_through_json() {
        let config = DedupConfig {
            grouping: GroupingStrategy::Sampled {
                test: SimilarityTest::Fingerprint(BlockComparison::AVERAGE_COLOR),
            },
            ..DedupConfig::default()
        };
        let text = serde_json::to_string(&config).unwrap();
        let parsed: DedupConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_match_config_rejects_bad_profiles() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("match.json");
        fs::write(
            &path,
            r#"{"profiles": [{"name": "x", "width": 10, "height": 10,
                "viewport": {"x": 0, "y": 5, "width": 10, "height": 10},
                "candidates": "direct"}]}"#,
        )
        .unwrap();

        assert!(matches!(
            MatchConfig::from_json_file(&path),
            Err(ConfigError::Profiles(_))
        ));
    }

    #[test]
    fn test_missing_and_malformed_files() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope.json");
        assert!(matches!(
            DedupConfig::from_json_file(&missing),
            Err(ConfigError::Io { .. })
        ));

        let broken = temp_dir.path().join("broken.json");
        fs::write(&broken, "{").unwrap();
        assert!(matches!(
            MatchConfig::from_json_file(&broken),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_default_match_config_uses_builtin_profiles() {
        let config = MatchConfig::default();
        assert!(config.profiles.detect(2048, 1536).is_some());
        assert!(!config.cancellation_token().is_cancelled());
    }
}
