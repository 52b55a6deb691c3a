//! Locate the harvested video frame that best matches a reference screenshot.
//!
//! The library covers three stages: fingerprinting candidate frames,
//! collapsing near-identical frames into one survivor per group, and ranking
//! the survivors against a viewport-cropped screenshot.

pub mod cli;
pub mod config;
pub mod core;
pub mod pipeline;

pub use crate::config::{DedupConfig, MatchConfig};
pub use crate::core::job::Job;
