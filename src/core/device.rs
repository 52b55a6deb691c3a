use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid profile table: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Viewport of profile '{name}' does not fit inside {width}x{height}")]
    ViewportOutOfBounds { name: String, width: u32, height: u32 },

    #[error("Duplicate profile for {width}x{height}")]
    DuplicateResolution { width: u32, height: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x.checked_add(self.width).is_some_and(|right| right <= width)
            && self.y.checked_add(self.height).is_some_and(|bottom| bottom <= height)
    }
}

/// How a candidate frame is brought to the same shape as the cropped screenshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateNormalization {
    /// Candidates already arrive at the cropped resolution.
    Direct,
    /// Resize to the device's native resolution, then crop the same viewport.
    ResizeThenCrop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub viewport: Rect,
    pub candidates: CandidateNormalization,
}

impl DeviceProfile {
    pub fn matches(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }
}

/// Lookup table from exact screenshot resolution to playback viewport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceProfiles {
    profiles: Vec<DeviceProfile>,
}

impl DeviceProfiles {
    pub fn new(profiles: Vec<DeviceProfile>) -> Result<Self, ProfileError> {
        let table = Self { profiles };
        table.validate()?;
        Ok(table)
    }

    /// The iPad and iPhone players the pipeline was first built for.
    pub fn builtin() -> Self {
        Self {
            profiles: vec![
                DeviceProfile {
                    name: "ipad".to_string(),
                    width: 2048,
                    height: 1536,
                    viewport: Rect::new(0, 190, 2048, 1150),
                    candidates: CandidateNormalization::ResizeThenCrop,
                },
                DeviceProfile {
                    name: "iphone".to_string(),
                    width: 1334,
                    height: 750,
                    viewport: Rect::new(0, 100, 1334, 550),
                    candidates: CandidateNormalization::ResizeThenCrop,
                },
            ],
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ProfileError> {
        let content = fs::read_to_string(path)?;
        let profiles: Vec<DeviceProfile> = serde_json::from_str(&content)?;
        Self::new(profiles)
    }

    /// Exact dimension match only; there is no tolerance.
    pub fn detect(&self, width: u32, height: u32) -> Option<&DeviceProfile> {
        self.profiles.iter().find(|p| p.matches(width, height))
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceProfile> {
        self.profiles.iter()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn validate(&self) -> Result<(), ProfileError> {
        for (i, profile) in self.profiles.iter().enumerate() {
            if !profile.viewport.fits_within(profile.width, profile.height) {
                return Err(ProfileError::ViewportOutOfBounds {
                    name: profile.name.clone(),
                    width: profile.width,
                    height: profile.height,
                });
            }
            if self.profiles[..i]
                .iter()
                .any(|earlier| earlier.matches(profile.width, profile.height))
            {
                return Err(ProfileError::DuplicateResolution {
                    width: profile.width,
                    height: profile.height,
                });
            }
        }
        Ok(())
    }
}

impl Default for DeviceProfiles {
    fn default() -> Self {
        Self::builtin()
    }
}
