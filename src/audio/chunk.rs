use super::meter;
use super::TARGET_RATE;
use crate::error::ChunkError;
use std::sync::Arc;
use std::time::Duration;

/// One capture read: exactly `frame_samples` mono i16 samples at 16 kHz.
///
/// Samples sit behind an `Arc` so the scheduler and the debug recorder tap can
/// share a chunk without copying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    seq: u64,
    samples: Arc<[i16]>,
}

impl AudioChunk {
    /// Build a chunk, rejecting anything that is not exactly one frame long.
    pub fn new(seq: u64, samples: Vec<i16>, frame_samples: usize) -> Result<Self, ChunkError> {
        if samples.len() != frame_samples {
            return Err(ChunkError::Length {
                expected: frame_samples,
                actual: samples.len(),
            });
        }
        Ok(Self {
            seq,
            samples: samples.into(),
        })
    }

    /// Capture order assigned by the source.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        samples_to_duration(self.samples.len())
    }

    pub fn rms_db(&self) -> f32 {
        meter::rms_db(&self.samples)
    }
}

/// Playback duration of `samples` at the target rate.
pub fn samples_to_duration(samples: usize) -> Duration {
    Duration::from_micros(samples as u64 * 1_000_000 / u64::from(TARGET_RATE))
}

/// Number of samples covering `ms` at the target rate.
pub(crate) fn ms_to_samples(ms: u64) -> usize {
    (ms * u64::from(TARGET_RATE) / 1000) as usize
}
