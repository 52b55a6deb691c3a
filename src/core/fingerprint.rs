use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::macroblock::{BlockComparison, Macroblock};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FingerprintError {
    #[error("Fingerprints derived from {left:?} and {right:?} images cannot be compared")]
    DimensionMismatch { left: (u32, u32), right: (u32, u32) },

    #[error("Image {width}x{height} is smaller than the {minimum}px minimum for block size {block_size}")]
    ImageTooSmall {
        width: u32,
        height: u32,
        block_size: u32,
        minimum: u32,
    },

    #[error("Block size must be at least 1")]
    ZeroBlockSize,
}

/// Anchor points a fingerprint samples, in storage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Anchor {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Center,
    FocusTopLeft,
    FocusTopRight,
    FocusBottomLeft,
    FocusBottomRight,
}

impl Anchor {
    pub const ALL: [Anchor; 9] = [
        Anchor::TopLeft,
        Anchor::TopRight,
        Anchor::BottomLeft,
        Anchor::BottomRight,
        Anchor::Center,
        Anchor::FocusTopLeft,
        Anchor::FocusTopRight,
        Anchor::FocusBottomLeft,
        Anchor::FocusBottomRight,
    ];

    /// Top-left corner of this anchor's block in a `width`×`height` image.
    pub fn origin(self, width: u32, height: u32, block: u32) -> (u32, u32) {
        let half = block / 2;
        let right = width - block;
        let bottom = height - block;
        let focus = |num: u32, extent: u32| (extent * num / 3).saturating_sub(half);
        match self {
            Anchor::TopLeft => (0, 0),
            Anchor::TopRight => (right, 0),
            Anchor::BottomLeft => (0, bottom),
            Anchor::BottomRight => (right, bottom),
            Anchor::Center => ((width / 2).saturating_sub(half), (height / 2).saturating_sub(half)),
            Anchor::FocusTopLeft => (focus(1, width), focus(1, height)),
            Anchor::FocusTopRight => (focus(2, width), focus(1, height)),
            Anchor::FocusBottomLeft => (focus(1, width), focus(2, height)),
            Anchor::FocusBottomRight => (focus(2, width), focus(2, height)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintConfig {
    pub block_size: u32,
}

impl FingerprintConfig {
    pub fn minimum_dimension(&self) -> u32 {
        self.block_size * 3
    }

    pub fn validate(&self, width: u32, height: u32) -> Result<(), FingerprintError> {
        if self.block_size == 0 {
            return Err(FingerprintError::ZeroBlockSize);
        }
        let minimum = self.minimum_dimension();
        if width < minimum || height < minimum {
            return Err(FingerprintError::ImageTooSmall {
                width,
                height,
                block_size: self.block_size,
                minimum,
            });
        }
        Ok(())
    }
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self { block_size: 4 }
    }
}

/// Nine macroblocks sampled at fixed anchors of a size-normalised image.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    source: (u32, u32),
    blocks: [Macroblock; 9],
}

impl Fingerprint {
    /// Sample every anchor of `img`.
    ///
    /// `img` must satisfy [`FingerprintConfig::validate`]; the loader checks
    /// its working resolution once up front.
    pub fn extract(img: &RgbImage, config: &FingerprintConfig) -> Self {
        let (width, height) = img.dimensions();
        let block = config.block_size;
        let blocks = Anchor::ALL.map(|anchor| {
            let (x, y) = anchor.origin(width, height, block);
            Macroblock::sample(img, x, y, block, block)
        });
        Self {
            source: (width, height),
            blocks,
        }
    }

    pub fn source_dimensions(&self) -> (u32, u32) {
        self.source
    }

    pub fn block(&self, anchor: Anchor) -> &Macroblock {
        &self.blocks[anchor as usize]
    }

    pub fn blocks(&self) -> &[Macroblock; 9] {
        &self.blocks
    }

    fn check_comparable(&self, other: &Self) -> Result<(), FingerprintError> {
        if self.source != other.source {
            return Err(FingerprintError::DimensionMismatch {
                left: self.source,
                right: other.source,
            });
        }
        Ok(())
    }

    /// True when every pair of corresponding blocks is similar.
    pub fn is_similar_to(
        &self,
        other: &Self,
        comparison: BlockComparison,
    ) -> Result<bool, FingerprintError> {
        self.check_comparable(other)?;
        Ok(self
            .blocks
            .iter()
            .zip(&other.blocks)
            .all(|(a, b)| a.is_similar(b, comparison)))
    }

    /// Largest per-block structural distance between two fingerprints.
    pub fn max_block_distance(&self, other: &Self) -> Result<f64, FingerprintError> {
        self.check_comparable(other)?;
        Ok(self
            .blocks
            .iter()
            .zip(&other.blocks)
            .filter_map(|(a, b)| a.structural_distance(b))
            .fold(0.0, f64::max))
    }
}

/// Sum of R+G+B over the four corner pixels; an orderable, cheap summary.
pub fn corner_sum(img: &RgbImage) -> u32 {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return 0;
    }
    [(0, 0), (width - 1, 0), (0, height - 1), (width - 1, height - 1)]
        .iter()
        .map(|&(x, y)| img.get_pixel(x, y).0.iter().map(|&c| c as u32).sum::<u32>())
        .sum()
}
