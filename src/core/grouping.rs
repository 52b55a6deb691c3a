//! Partition candidate frames into groups believed to show the same content.
//!
//! Two strategies are offered:
//!
//! * **Sampled** compares each candidate against the first member of every
//!   existing group and joins the first group that matches. This costs
//!   O(n·g) for g groups rather than full pairwise clustering, so records
//!   that are close transitively but not to a group's representative may be
//!   split depending on input order.
//! * **Sorted buckets** orders candidates by their corner sum and starts a
//!   new group whenever neighbouring sums differ by more than `epsilon`.
//!   Only adjacent members are guaranteed to be close.

use image::RgbImage;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::core::loader::Candidate;
use crate::core::macroblock::BlockComparison;

/// Random pixel sampling test between two working images.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PixelSampling {
    /// Share of the pixel area to inspect, without repetition.
    pub sample_ratio: f64,
    /// Largest per-channel difference still counted as the same colour.
    pub channel_epsilon: u8,
    /// Dissimilar samples must stay below this share of the total area.
    pub max_dissimilar_ratio: f64,
}

impl Default for PixelSampling {
    fn default() -> Self {
        Self {
            sample_ratio: 0.4,
            channel_epsilon: 4,
            max_dissimilar_ratio: 0.10,
        }
    }
}

impl PixelSampling {
    pub fn images_similar<R: Rng + ?Sized>(&self, a: &RgbImage, b: &RgbImage, rng: &mut R) -> bool {
        if a.dimensions() != b.dimensions() {
            return false;
        }
        let (width, height) = a.dimensions();
        let total = width as usize * height as usize;
        if total == 0 {
            return true;
        }

        let amount = ((total as f64 * self.sample_ratio).ceil() as usize).min(total);
        let limit = total as f64 * self.max_dissimilar_ratio;
        let mut dissimilar = 0usize;

        for index in rand::seq::index::sample(rng, total, amount).iter() {
            let x = (index % width as usize) as u32;
            let y = (index / width as usize) as u32;
            if self.colors_differ(&a.get_pixel(x, y).0, &b.get_pixel(x, y).0) {
                dissimilar += 1;
                if dissimilar as f64 >= limit {
                    return false;
                }
            }
        }
        true
    }

    fn colors_differ(&self, a: &[u8; 3], b: &[u8; 3]) -> bool {
        a.iter()
            .zip(b)
            .any(|(&ca, &cb)| ca.abs_diff(cb) > self.channel_epsilon)
    }
}

/// Predicate used by the sampled strategy to join a group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityTest {
    Fingerprint(BlockComparison),
    /// Tolerates small localized changes such as overlays at an anchor.
    SampledPixels(PixelSampling),
    /// Fingerprint prefilter, confirmed by pixel sampling. Stricter: any
    /// anchor block that moves past the block threshold splits the pair.
    FingerprintThenPixels {
        blocks: BlockComparison,
        pixels: PixelSampling,
    },
}

impl Default for SimilarityTest {
    fn default() -> Self {
        Self::SampledPixels(PixelSampling::default())
    }
}

impl SimilarityTest {
    pub fn fingerprint_then_pixels() -> Self {
        Self::FingerprintThenPixels {
            blocks: BlockComparison::default(),
            pixels: PixelSampling::default(),
        }
    }
}

impl SimilarityTest {
    pub fn is_similar<R: Rng + ?Sized>(&self, a: &Candidate, b: &Candidate, rng: &mut R) -> bool {
        match self {
            Self::Fingerprint(blocks) => fingerprints_similar(a, b, *blocks),
            Self::SampledPixels(pixels) => pixels.images_similar(&a.image, &b.image, rng),
            Self::FingerprintThenPixels { blocks, pixels } => {
                fingerprints_similar(a, b, *blocks) && pixels.images_similar(&a.image, &b.image, rng)
            }
        }
    }
}

fn fingerprints_similar(a: &Candidate, b: &Candidate, blocks: BlockComparison) -> bool {
    match a.fingerprint.is_similar_to(&b.fingerprint, blocks) {
        Ok(similar) => similar,
        Err(e) => {
            log::debug!("{} vs {}: {}", a.path.display(), b.path.display(), e);
            false
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum GroupingStrategy {
    Sampled { test: SimilarityTest },
    SortedBuckets { epsilon: u32 },
}

impl GroupingStrategy {
    pub const DEFAULT_BUCKET_EPSILON: u32 = 12;

    pub fn sorted_buckets() -> Self {
        Self::SortedBuckets {
            epsilon: Self::DEFAULT_BUCKET_EPSILON,
        }
    }
}

impl Default for GroupingStrategy {
    fn default() -> Self {
        Self::Sampled {
            test: SimilarityTest::default(),
        }
    }
}

/// Candidates believed to depict the same frame. Never empty.
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    members: Vec<Candidate>,
}

impl DuplicateGroup {
    /// `None` for an empty member list.
    pub fn from_members(members: Vec<Candidate>) -> Option<Self> {
        if members.is_empty() {
            return None;
        }
        Some(Self { members })
    }

    /// The member that survives elimination.
    pub fn representative(&self) -> &Candidate {
        &self.members[0]
    }

    /// Members other than the representative.
    pub fn duplicates(&self) -> &[Candidate] {
        &self.members[1..]
    }

    pub fn members(&self) -> &[Candidate] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

pub struct DuplicateGrouper {
    strategy: GroupingStrategy,
}

impl DuplicateGrouper {
    pub fn new(strategy: GroupingStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> GroupingStrategy {
        self.strategy
    }

    /// Partition `candidates` into disjoint groups covering every input once.
    pub fn group<R: Rng + ?Sized>(&self, candidates: Vec<Candidate>, rng: &mut R) -> Vec<DuplicateGroup> {
        let total = candidates.len();
        let groups = match self.strategy {
            GroupingStrategy::Sampled { test } => {
                cluster_by_representative(candidates, |rep, c| test.is_similar(rep, c, &mut *rng))
            }
            GroupingStrategy::SortedBuckets { epsilon } => {
                bucket_sorted(candidates, |c| c.corner_sum, epsilon)
            }
        };
        log::info!(
            "Grouped {} candidate(s) into {} group(s) using {:?}",
            total,
            groups.len(),
            self.strategy
        );
        groups
            .into_iter()
            .filter_map(DuplicateGroup::from_members)
            .collect()
    }
}

/// Single pass: each item joins the first group whose first member it resembles.
pub fn cluster_by_representative<T, F>(items: Vec<T>, mut similar: F) -> Vec<Vec<T>>
where
    F: FnMut(&T, &T) -> bool,
{
    let mut groups: Vec<Vec<T>> = Vec::new();
    for item in items {
        match groups.iter_mut().find(|g| similar(&g[0], &item)) {
            Some(group) => group.push(item),
            None => groups.push(vec![item]),
        }
    }
    groups
}

/// Stable sort by `key`, then split wherever neighbouring keys differ by more than `epsilon`.
pub fn bucket_sorted<T, K>(mut items: Vec<T>, key: K, epsilon: u32) -> Vec<Vec<T>>
where
    K: Fn(&T) -> u32,
{
    items.sort_by_key(|item| key(item));

    let mut groups: Vec<Vec<T>> = Vec::new();
    let mut previous: Option<u32> = None;
    for item in items {
        let current = key(&item);
        match (previous, groups.last_mut()) {
            (Some(prev), Some(group)) if prev.abs_diff(current) <= epsilon => group.push(item),
            _ => groups.push(vec![item]),
        }
        previous = Some(current);
    }
    groups
}
