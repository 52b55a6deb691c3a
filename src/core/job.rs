use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// One screenshot and the harvested frames that might show the same moment.
///
/// Stages never mutate a job in place; each returns a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub original: PathBuf,
    #[serde(default)]
    pub snapshots: Vec<PathBuf>,
    /// Playback position in seconds, when one was read off the screenshot.
    #[serde(default)]
    pub timestamp: Option<f64>,
    /// Similarity of the chosen snapshot, 0 to 100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
}

impl Job {
    pub fn new(original: impl Into<PathBuf>) -> Self {
        Self {
            original: original.into(),
            snapshots: Vec::new(),
            timestamp: None,
            score: None,
        }
    }

    pub fn with_timestamp(self, timestamp: f64) -> Self {
        Self {
            timestamp: Some(timestamp),
            ..self
        }
    }

    pub fn with_snapshots<I, P>(&self, snapshots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut next = self.clone();
        next.snapshots.extend(snapshots.into_iter().map(Into::into));
        next
    }

    /// Drop every snapshot not in `survivors`, keeping order.
    pub fn pruned_to(&self, survivors: &HashSet<PathBuf>) -> Self {
        Self {
            snapshots: self
                .snapshots
                .iter()
                .filter(|p| survivors.contains(*p))
                .cloned()
                .collect(),
            ..self.clone()
        }
    }

    /// Replace the snapshot list with the single chosen frame.
    pub fn collapsed_to(&self, chosen: &Path, score: u8) -> Self {
        Self {
            snapshots: vec![chosen.to_path_buf()],
            score: Some(score),
            ..self.clone()
        }
    }
}

pub fn read_jobs<R: Read>(reader: R) -> serde_json::Result<Vec<Job>> {
    serde_json::from_reader(reader)
}

pub fn write_jobs<W: Write>(mut writer: W, jobs: &[Job]) -> std::io::Result<()> {
    serde_json::to_writer_pretty(&mut writer, jobs)?;
    writeln!(writer)?;
    writer.flush()
}
