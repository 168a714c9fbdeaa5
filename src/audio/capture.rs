//! Capture worker: the producer half of the pipeline.
//!
//! Reads chunks from an [`AudioSource`] as fast as the source delivers them
//! and offers each one to the scheduler queue and, optionally, to the debug
//! recorder tap. Neither offer ever blocks; a full queue drops the new chunk.

use super::chunk::AudioChunk;
use super::queue::ChunkProducer;
use super::source::AudioSource;
use crate::error::{DeviceError, PipelineError};
use crate::log_debug;
use crate::pipeline::ShutdownFlag;
use std::thread;

/// Log the first overflow and then every Nth so a stuck consumer is visible
/// without flooding the log.
const DROP_LOG_EVERY: u64 = 50;

/// Totals reported when the worker exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub chunks_read: u64,
    pub chunks_dropped: u64,
    pub tap_dropped: u64,
}

/// Handle to the running capture thread.
pub struct CaptureWorker {
    handle: thread::JoinHandle<Result<CaptureStats, DeviceError>>,
}

impl CaptureWorker {
    /// Wait for the thread and surface its device failure, if any.
    pub fn join(self) -> Result<CaptureStats, PipelineError> {
        match self.handle.join() {
            Ok(result) => result.map_err(PipelineError::Device),
            Err(_) => Err(PipelineError::WorkerPanicked("capture")),
        }
    }
}

/// Spawn the capture thread.
pub fn spawn_capture_worker(
    source: Box<dyn AudioSource>,
    producer: ChunkProducer,
    tap: Option<ChunkProducer>,
    shutdown: ShutdownFlag,
) -> std::io::Result<CaptureWorker> {
    let handle = thread::Builder::new()
        .name("wakeplay-capture".to_string())
        .spawn(move || run_capture_loop(source, &producer, tap.as_ref(), &shutdown))?;
    Ok(CaptureWorker { handle })
}

/// The worker body, callable directly from tests. A finite source running dry
/// is a clean stop; any other device failure also requests shutdown.
pub(crate) fn run_capture_loop(
    mut source: Box<dyn AudioSource>,
    producer: &ChunkProducer,
    tap: Option<&ChunkProducer>,
    shutdown: &ShutdownFlag,
) -> Result<CaptureStats, DeviceError> {
    log_debug(&format!("capture worker started: {}", source.describe()));
    let mut stats = CaptureStats::default();

    let result = loop {
        if shutdown.is_requested() {
            break Ok(());
        }
        let chunk = match source.read_chunk() {
            Ok(chunk) => chunk,
            Err(err) if err.is_end_of_stream() => break Ok(()),
            Err(err) => break Err(err),
        };
        stats.chunks_read += 1;
        if let Some(tap) = tap {
            if tap.offer(chunk.clone()).is_err() {
                stats.tap_dropped += 1;
            }
        }
        offer_to_scheduler(producer, chunk, &mut stats);
    };

    stats.chunks_dropped = producer.dropped().get();
    log_debug(&format!(
        "capture worker stopped: read={} dropped={} tap_dropped={}",
        stats.chunks_read, stats.chunks_dropped, stats.tap_dropped
    ));
    match result {
        Ok(()) => Ok(stats),
        Err(err) => {
            tracing::error!(target: "wakeplay::capture", error = %err, chunks_read = stats.chunks_read, "capture device failed");
            // A dead device stops the whole pipeline, playback included; only a
            // finite source running dry lets the scheduler wait for the video.
            shutdown.request();
            Err(err)
        }
    }
}

fn offer_to_scheduler(producer: &ChunkProducer, chunk: AudioChunk, stats: &mut CaptureStats) {
    let Err(overflow) = producer.offer(chunk) else {
        return;
    };
    stats.chunks_dropped = overflow.total_dropped;
    if overflow.total_dropped == 1 || overflow.total_dropped % DROP_LOG_EVERY == 0 {
        log_debug(&format!("{overflow}"));
        tracing::warn!(
            target: "wakeplay::capture",
            seq = overflow.seq,
            total_dropped = overflow.total_dropped,
            "chunk queue overflow"
        );
    }
}
