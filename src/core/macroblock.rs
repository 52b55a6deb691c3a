use image::RgbImage;
use serde::{Deserialize, Serialize};

/// How two macroblocks are judged similar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BlockComparison {
    /// Euclidean distance over every per-channel difference, inclusive bound.
    Structural { max_distance: f64 },
    /// Manhattan distance between the blocks' mean colours, exclusive bound.
    AverageColor { max_channel_sum: f64 },
}

impl BlockComparison {
    pub const STRUCTURAL: Self = Self::Structural {
        max_distance: 150.0,
    };
    pub const AVERAGE_COLOR: Self = Self::AverageColor {
        max_channel_sum: 45.0,
    };
}

impl Default for BlockComparison {
    fn default() -> Self {
        Self::STRUCTURAL
    }
}

/// A small grid of RGB samples copied out of a source image.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Macroblock {
    width: u32,
    height: u32,
    samples: Vec<[u8; 3]>,
}

impl Macroblock {
    /// Copy the `width`×`height` block whose top-left corner is `(x, y)`.
    ///
    /// The block must lie inside `img`; callers guarantee this through the
    /// minimum image size enforced before fingerprinting.
    pub fn sample(img: &RgbImage, x: u32, y: u32, width: u32, height: u32) -> Self {
        debug_assert!(x + width <= img.width() && y + height <= img.height());
        let mut samples = Vec::with_capacity((width * height) as usize);
        for row in y..y + height {
            for col in x..x + width {
                samples.push(img.get_pixel(col, row).0);
            }
        }
        Self {
            width,
            height,
            samples,
        }
    }

    pub fn from_samples(width: u32, height: u32, samples: Vec<[u8; 3]>) -> Option<Self> {
        if samples.len() != (width as usize) * (height as usize) {
            return None;
        }
        Some(Self {
            width,
            height,
            samples,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn samples(&self) -> &[[u8; 3]] {
        &self.samples
    }

    fn same_shape(&self, other: &Self) -> bool {
        self.dimensions() == other.dimensions()
    }

    /// Euclidean distance over all channel differences, `None` for mismatched shapes.
    pub fn structural_distance(&self, other: &Self) -> Option<f64> {
        if !self.same_shape(other) {
            return None;
        }
        let sum: f64 = self
            .samples
            .iter()
            .zip(&other.samples)
            .flat_map(|(a, b)| a.iter().zip(b).map(|(&ca, &cb)| ca as f64 - cb as f64))
            .map(|d| d * d)
            .sum();
        Some(sum.sqrt())
    }

    pub fn average_color(&self) -> [f64; 3] {
        if self.samples.is_empty() {
            return [0.0; 3];
        }
        let mut totals = [0u64; 3];
        for sample in &self.samples {
            for (total, &channel) in totals.iter_mut().zip(sample) {
                *total += channel as u64;
            }
        }
        let n = self.samples.len() as f64;
        totals.map(|t| t as f64 / n)
    }

    /// Sum of absolute per-channel differences between mean colours.
    pub fn average_color_distance(&self, other: &Self) -> Option<f64> {
        if !self.same_shape(other) {
            return None;
        }
        let a = self.average_color();
        let b = other.average_color();
        Some(a.iter().zip(&b).map(|(x, y)| (x - y).abs()).sum())
    }

    pub fn is_similar(&self, other: &Self, comparison: BlockComparison) -> bool {
        match comparison {
            BlockComparison::Structural { max_distance } => self
                .structural_distance(other)
                .is_some_and(|d| d <= max_distance),
            BlockComparison::AverageColor { max_channel_sum } => self
                .average_color_distance(other)
                .is_some_and(|d| d < max_channel_sum),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Macroblock {
        Macroblock::from_samples(width, height, vec![rgb; (width * height) as usize]).unwrap()
    }

    #[test]
    fn test_sample_copies_expected_region() {
        let img: RgbImage = ImageBuffer::from_fn(10, 10, |x, y| Rgb([x as u8, y as u8, 0]));
        let block = Macroblock::sample(&img, 2, 3, 2, 2);
        assert_eq!(block.dimensions(), (2, 2));
        assert_eq!(block.samples(), &[[2, 3, 0], [3, 3, 0], [2, 4, 0], [3, 4, 0]]);
    }

    #[test]
    fn test_from_samples_rejects_wrong_length() {
        assert!(Macroblock::from_samples(2, 2, vec![[0, 0, 0]; 3]).is_none());
    }

    #[test]
    fn test_distance_symmetry_and_identity() {
        let a = solid(4, 4, [10, 20, 30]);
        let b = solid(4, 4, [40, 10, 30]);
        assert_eq!(a.structural_distance(&a), Some(0.0));
        assert_eq!(a.structural_distance(&b), b.structural_distance(&a));
        assert_eq!(a.average_color_distance(&b), b.average_color_distance(&a));
    }

    #[test]
    fn test_structural_threshold_is_inclusive() {
        // 16 pixels x 3 channels, each differing by d: distance = d * sqrt(48)
        let a = solid(4, 4, [100, 100, 100]);
        let near = solid(4, 4, [121, 121, 121]);
        let far = solid(4, 4, [122, 122, 122]);
        assert!(a.structural_distance(&near).unwrap() <= 150.0);
        assert!(a.is_similar(&near, BlockComparison::STRUCTURAL));
        assert!(!a.is_similar(&far, BlockComparison::STRUCTURAL));

        let exact = BlockComparison::Structural {
            max_distance: a.structural_distance(&near).unwrap(),
        };
        assert!(a.is_similar(&near, exact));
    }

    #[test]
    fn test_average_color_threshold_is_exclusive() {
        let a = solid(4, 4, [100, 100, 100]);
        let b = solid(4, 4, [115, 115, 114]);
        let c = solid(4, 4, [115, 115, 115]);
        assert_eq!(a.average_color_distance(&b), Some(44.0));
        assert!(a.is_similar(&b, BlockComparison::AVERAGE_COLOR));
        assert!(!a.is_similar(&c, BlockComparison::AVERAGE_COLOR));
    }

    #[test]
    fn test_average_color_threshold_compares_fractional_means() {
        let a = Macroblock::from_samples(2, 1, vec![[0, 0, 0]; 2]).unwrap();
        let b = Macroblock::from_samples(2, 1, vec![[15, 15, 15], [14, 14, 14]]).unwrap();

        assert_eq!(a.average_color_distance(&b), Some(43.5));
        assert!(a.is_similar(&b, BlockComparison::AverageColor { max_channel_sum: 43.6 }));
        assert!(!a.is_similar(&b, BlockComparison::AverageColor { max_channel_sum: 43.5 }));
    }

    #[test]
    fn test_modes_disagree_on_rearranged_pixels() {
        let mut samples = vec![[0, 0, 0]; 8];
        samples.extend(vec![[255, 255, 255]; 8]);
        let a = Macroblock::from_samples(4, 4, samples.clone()).unwrap();
        samples.reverse();
        let b = Macroblock::from_samples(4, 4, samples).unwrap();

        assert!(a.is_similar(&b, BlockComparison::AVERAGE_COLOR));
        assert!(!a.is_similar(&b, BlockComparison::STRUCTURAL));
    }

    #[test]
    fn test_mismatched_shapes_are_never_similar_or_equal() {
        let a = solid(4, 4, [1, 2, 3]);
        let b = solid(2, 8, [1, 2, 3]);
        assert_ne!(a, b);
        assert!(a.structural_distance(&b).is_none());
        assert!(!a.is_similar(&b, BlockComparison::STRUCTURAL));
        assert!(!a.is_similar(&b, BlockComparison::AVERAGE_COLOR));
    }
}
