//! Trailing window of recent audio that the detector scores.

use super::chunk::{samples_to_duration, AudioChunk};
use std::collections::VecDeque;
use std::time::Duration;

/// Contiguous copy of the window handed to the detector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clip {
    pub samples: Vec<i16>,
    pub first_seq: u64,
    pub last_seq: u64,
    /// Stream offset of the end of the newest chunk in the clip.
    pub window_end: Duration,
}

impl Clip {
    pub fn duration(&self) -> Duration {
        samples_to_duration(self.samples.len())
    }
}

/// The window holds less audio than the warm-up floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotReady {
    pub buffered_samples: usize,
    pub required_samples: usize,
}

/// FIFO of the newest chunks whose total length never exceeds `max_samples`.
#[derive(Debug)]
pub struct RollingWindow {
    chunks: VecDeque<AudioChunk>,
    total_samples: usize,
    max_samples: usize,
    min_fill_samples: usize,
}

impl RollingWindow {
    /// `min_fill_samples` is clamped to `max_samples`; a window can never be
    /// required to hold more than it is allowed to.
    pub fn new(max_samples: usize, min_fill_samples: usize) -> Self {
        let max_samples = max_samples.max(1);
        Self {
            chunks: VecDeque::new(),
            total_samples: 0,
            max_samples,
            min_fill_samples: min_fill_samples.min(max_samples),
        }
    }

    pub fn append(&mut self, chunk: AudioChunk) {
        self.total_samples = self.total_samples.saturating_add(chunk.len());
        self.chunks.push_back(chunk);
        while self.total_samples > self.max_samples {
            match self.chunks.pop_front() {
                Some(evicted) => {
                    self.total_samples = self.total_samples.saturating_sub(evicted.len());
                }
                None => break,
            }
        }
    }

    /// Concatenate the buffered chunks without mutating the window.
    pub fn snapshot(&self) -> Result<Clip, NotReady> {
        if !self.is_ready() {
            return Err(NotReady {
                buffered_samples: self.total_samples,
                required_samples: self.min_fill_samples.max(1),
            });
        }
        let (Some(first), Some(last)) = (self.chunks.front(), self.chunks.back()) else {
            return Err(NotReady {
                buffered_samples: 0,
                required_samples: self.min_fill_samples.max(1),
            });
        };
        let mut samples = Vec::with_capacity(self.total_samples);
        for chunk in &self.chunks {
            samples.extend_from_slice(chunk.samples());
        }
        let window_end = samples_to_duration((last.seq() as usize + 1) * last.len());
        Ok(Clip {
            samples,
            first_seq: first.seq(),
            last_seq: last.seq(),
            window_end,
        })
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.total_samples = 0;
    }

    /// Ready once the warm-up floor is met, or once the window is as full as
    /// whole chunks allow (5 s is not a multiple of 80 ms).
    pub fn is_ready(&self) -> bool {
        let Some(newest) = self.chunks.back() else {
            return false;
        };
        self.total_samples >= self.min_fill_samples
            || self.total_samples + newest.len() > self.max_samples
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn buffered_samples(&self) -> usize {
        self.total_samples
    }

    pub fn buffered_duration(&self) -> Duration {
        samples_to_duration(self.total_samples)
    }

    pub fn max_samples(&self) -> usize {
        self.max_samples
    }

    pub(crate) fn seqs(&self) -> impl Iterator<Item = u64> + '_ {
        self.chunks.iter().map(AudioChunk::seq)
    }
}
