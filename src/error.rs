//! Error taxonomy for the capture/detection pipeline.
//!
//! Only [`DeviceError`] and sustained [`DetectorError`]s escalate into a
//! [`PipelineError`]; everything else is absorbed where it happens and shows up
//! in logs and counters.

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Failures reading from the capture device (or a replayed file).
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("audio input unavailable: {0}")]
    Unavailable(String),

    #[error("audio input disconnected: {0}")]
    Disconnected(String),

    #[error("audio input stalled: no samples for {ms} ms")]
    Stalled { ms: u64 },

    #[error("audio stream error: {0}")]
    Stream(String),

    #[error("malformed chunk from audio source: {0}")]
    Malformed(#[from] ChunkError),

    /// Finite sources (WAV replay) report this once they run dry.
    #[error("audio source reached end of stream")]
    EndOfStream,
}

impl DeviceError {
    /// End-of-stream is the only device outcome treated as a clean stop.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, DeviceError::EndOfStream)
    }
}

/// Rejected chunk construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkError {
    #[error("chunk has {actual} samples, expected {expected}")]
    Length { expected: usize, actual: usize },
}

/// The producer dropped a chunk because the queue was full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("chunk queue full; dropped chunk #{seq} ({total_dropped} dropped so far)")]
pub struct QueueOverflow {
    pub seq: u64,
    pub total_dropped: u64,
}

/// Failures talking to the detector model.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("failed to launch detector helper '{command}': {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("detector helper i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("detector helper exited")]
    Exited,

    #[error("detector protocol error: {0}")]
    Protocol(String),

    #[error("detector rejected request: {0}")]
    Rejected(String),
}

/// Failures launching or running the media player.
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("failed to launch player '{command}': {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("player exited with {0}")]
    Failed(ExitStatus),

    #[error("failed to wait on player: {0}")]
    Wait(#[source] std::io::Error),
}

/// Failures inside the debug recorder. Never leaves the recorder thread.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("failed to create debug recording directory '{}': {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },
}

/// Fatal pipeline outcomes.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("detector failed {consecutive} consecutive checks; last error: {last}")]
    Detector {
        consecutive: u32,
        #[source]
        last: DetectorError,
    },

    #[error("{0} worker thread panicked")]
    WorkerPanicked(&'static str),
}

impl PipelineError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Device(_) => 2,
            PipelineError::Detector { .. } => 3,
            PipelineError::WorkerPanicked(_) => 4,
        }
    }
}
