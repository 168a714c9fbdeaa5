//! Audio capture plumbing: fixed-size chunks, the bounded producer/consumer
//! queue, the rolling detection window, and the sources that feed them.
//!
//! Everything downstream of a source works on 16 kHz mono i16 PCM, the format
//! the wake-phrase models are trained on. Device audio is downmixed and
//! resampled before it is sliced into chunks.

/// Sample rate every chunk is delivered at.
pub const TARGET_RATE: u32 = 16_000;

/// Channel count every chunk is delivered at.
pub const TARGET_CHANNELS: u16 = 1;

/// 80 ms at 16 kHz, the frame size wake-phrase models consume.
pub const DEFAULT_FRAME_SAMPLES: usize = 1280;

mod capture;
mod chunk;
mod dispatch;
mod meter;
mod queue;
mod recorder;
mod resample;
mod source;
#[cfg(test)]
mod tests;
mod window;

pub use capture::{spawn_capture_worker, CaptureStats, CaptureWorker};
pub use chunk::{samples_to_duration, AudioChunk};
pub use meter::{level_stats, rms_db, LevelStats, LevelVerdict};
pub use queue::{chunk_queue, ChunkConsumer, ChunkProducer, DropCounter};
pub use recorder::{MicSource, Recorder};
pub use source::{AudioSource, WavFormat, WavSource};
pub use window::{Clip, NotReady, RollingWindow};

pub(crate) use chunk::ms_to_samples;
