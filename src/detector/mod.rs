//! Boundary to the wake-phrase acoustic model.
//!
//! The model itself is opaque. The pipeline only needs to reset its streaming
//! state, score a whole clip, and (for the offline file scanner) score a
//! single chunk.

mod command;

pub use command::{CommandDetector, DetectorCommand};

use crate::audio::{AudioChunk, Clip};
use crate::error::DetectorError;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Per-label confidences for one scored window.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DetectionResult {
    pub scores: BTreeMap<String, f32>,
    /// Stream offset of the end of the audio that was scored.
    pub window_end: Duration,
}

impl DetectionResult {
    pub fn new(scores: BTreeMap<String, f32>, window_end: Duration) -> Self {
        Self { scores, window_end }
    }

    /// Highest-scoring label whose score is strictly above its threshold.
    ///
    /// Exact ties go to the lexicographically smallest label. NaN scores never
    /// qualify.
    pub fn best_above(&self, thresholds: &Thresholds) -> Option<(&str, f32)> {
        let mut best: Option<(&str, f32)> = None;
        for (label, &score) in &self.scores {
            if !(score > thresholds.for_label(label)) {
                continue;
            }
            match best {
                Some((_, top)) if score <= top => {}
                _ => best = Some((label.as_str(), score)),
            }
        }
        best
    }

    /// Highest score regardless of threshold, for logging.
    pub fn peak(&self) -> Option<(&str, f32)> {
        self.scores
            .iter()
            .fold(None, |best: Option<(&str, f32)>, (label, &score)| match best {
                Some((_, top)) if score <= top => best,
                _ => Some((label.as_str(), score)),
            })
    }
}

/// Detection thresholds: one default plus optional per-label overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    default: f32,
    per_label: BTreeMap<String, f32>,
}

impl Thresholds {
    pub fn new(default: f32) -> Self {
        Self {
            default,
            per_label: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>, threshold: f32) -> Self {
        self.per_label.insert(label.into(), threshold);
        self
    }

    pub fn for_label(&self, label: &str) -> f32 {
        self.per_label.get(label).copied().unwrap_or(self.default)
    }

    pub fn default_threshold(&self) -> f32 {
        self.default
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::new(0.5)
    }
}

/// Which model(s) the detector should load. Resolution happens in the helper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelRef {
    /// Built-in model identifiers, e.g. `hey_jarvis`.
    Named(Vec<String>),
    /// A custom model file; wins over named models when both are configured.
    File(PathBuf),
}

impl ModelRef {
    pub(crate) fn helper_args(&self) -> Vec<String> {
        match self {
            ModelRef::Named(names) => vec!["--models".to_string(), names.join(",")],
            ModelRef::File(path) => vec![
                "--model-path".to_string(),
                path.to_string_lossy().into_owned(),
            ],
        }
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelRef::Named(names) => write!(f, "{}", names.join(", ")),
            ModelRef::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// The acoustic model as the scheduler sees it.
pub trait WakeModel: Send {
    /// Drop any streaming state carried over from earlier audio.
    fn reset(&mut self) -> Result<(), DetectorError>;

    /// Streaming mode: score one chunk as a continuation of earlier chunks.
    fn score_chunk(&mut self, chunk: &AudioChunk) -> Result<DetectionResult, DetectorError>;

    /// Score a whole clip; may yield one result per internal frame.
    fn score_clip(&mut self, clip: &Clip) -> Result<Vec<DetectionResult>, DetectorError>;

    /// Labels the model reports scores for.
    fn labels(&self) -> Vec<String>;
}

impl<M: WakeModel + ?Sized> WakeModel for Box<M> {
    fn reset(&mut self) -> Result<(), DetectorError> {
        (**self).reset()
    }

    fn score_chunk(&mut self, chunk: &AudioChunk) -> Result<DetectionResult, DetectorError> {
        (**self).score_chunk(chunk)
    }

    fn score_clip(&mut self, clip: &Clip) -> Result<Vec<DetectionResult>, DetectorError> {
        (**self).score_clip(clip)
    }

    fn labels(&self) -> Vec<String> {
        (**self).labels()
    }
}
