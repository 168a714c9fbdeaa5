//! Wiring: source → capture worker → queue → scheduler, plus the optional
//! debug recorder tap, and the shutdown handshake between them.

use crate::audio::{
    chunk_queue, ms_to_samples, spawn_capture_worker, AudioSource, CaptureStats, RollingWindow,
};
use crate::debug_recorder::{spawn_debug_recorder, RecorderConfig, RecorderStats, RollingRecorder};
use crate::detector::{Thresholds, WakeModel};
use crate::error::{DeviceError, PipelineError};
use crate::log_debug;
use crate::player::Player;
use crate::scheduler::{DetectionScheduler, SchedulerConfig, SchedulerStats};
use crate::trigger::{TriggerController, TriggerStats};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cooperative stop signal shared by every pipeline thread.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything the running pipeline needs, already validated.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub frame_samples: usize,
    pub queue_capacity: usize,
    pub window_ms: u64,
    pub min_fill_ms: u64,
    pub check_interval: Duration,
    pub cooldown: Duration,
    pub idle_wake: Duration,
    pub thresholds: Thresholds,
    pub media_path: PathBuf,
    pub max_detector_failures: u32,
    pub debug_recording: Option<RecorderConfig>,
    /// Print status lines to stdout.
    pub announce: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_samples: crate::audio::DEFAULT_FRAME_SAMPLES,
            queue_capacity: 100,
            window_ms: 5_000,
            min_fill_ms: 5_000,
            check_interval: Duration::from_secs(1),
            cooldown: Duration::from_secs(1),
            idle_wake: Duration::from_millis(100),
            thresholds: Thresholds::default(),
            media_path: PathBuf::from("video.mp4"),
            max_detector_failures: 5,
            debug_recording: None,
            announce: false,
        }
    }
}

impl PipelineConfig {
    fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            check_interval: self.check_interval,
            idle_wake: self.idle_wake,
            max_detector_failures: self.max_detector_failures,
        }
    }
}

/// Totals gathered from every stage once the pipeline has stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub capture: CaptureStats,
    pub scheduler: SchedulerStats,
    pub trigger: TriggerStats,
    pub recorder: Option<RecorderStats>,
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run until `shutdown` is requested, the source ends, or a fatal error.
    ///
    /// The scheduler runs on the calling thread. On the way out every worker is
    /// told to stop and joined; a scheduler failure takes precedence over a
    /// capture failure.
    pub fn run(
        self,
        source: Box<dyn AudioSource>,
        model: Box<dyn WakeModel>,
        player: Box<dyn Player>,
        shutdown: &ShutdownFlag,
    ) -> Result<PipelineReport, PipelineError> {
        let config = self.config;
        let (producer, consumer) = chunk_queue(config.queue_capacity);

        let mut recorder = None;
        let mut tap = None;
        if let Some(recorder_config) = config.debug_recording.clone() {
            match RollingRecorder::new(recorder_config) {
                Ok(rolling) => {
                    let (tap_producer, tap_consumer) = chunk_queue(config.queue_capacity);
                    match spawn_debug_recorder(tap_consumer, rolling, shutdown.clone()) {
                        Ok(handle) => {
                            recorder = Some(handle);
                            tap = Some(tap_producer);
                        }
                        Err(err) => log_debug(&format!("debug recorder not started: {err}")),
                    }
                }
                Err(err) => {
                    log_debug(&format!("debug recording disabled: {err}"));
                    tracing::warn!(target: "wakeplay::pipeline", error = %err, "debug recording disabled");
                }
            }
        }

        log_debug(&format!("pipeline starting: source={}", source.describe()));
        let capture = spawn_capture_worker(source, producer, tap, shutdown.clone()).map_err(
            |err| DeviceError::Unavailable(format!("failed to spawn capture worker: {err}")),
        )?;

        let window = RollingWindow::new(
            ms_to_samples(config.window_ms),
            ms_to_samples(config.min_fill_ms),
        );
        let trigger = TriggerController::new(
            config.thresholds.clone(),
            config.media_path.clone(),
            player,
            config.cooldown,
        )
        .with_announce(config.announce);
        let mut scheduler = DetectionScheduler::new(
            consumer,
            window,
            model,
            trigger,
            config.scheduler_config(),
        );

        let scheduled = scheduler.run(shutdown);
        let trigger_stats = scheduler.trigger().stats();
        shutdown.request();
        // Releasing the queue unblocks a producer stuck on a disconnected peer.
        drop(scheduler);

        let captured = capture.join();
        let recorder_stats = recorder.and_then(|handle| handle.join());

        let scheduler_stats = scheduled?;
        let capture_stats = captured?;
        let report = PipelineReport {
            capture: capture_stats,
            scheduler: scheduler_stats,
            trigger: trigger_stats,
            recorder: recorder_stats,
        };
        log_debug(&format!("pipeline stopped: {report:?}"));
        Ok(report)
    }
}
