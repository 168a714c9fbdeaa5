//! Detection scheduler: the consumer half of the pipeline.
//!
//! The loop is paced only by chunk arrival. It blocks on the queue, drains
//! whatever is waiting into the rolling window, and on a separate wall-clock
//! cadence scores the window. There is no fixed sleep anywhere in the loop;
//! the idle timeout only exists so shutdown and playback exit are noticed
//! when the device goes quiet.

mod clock;

pub use clock::CheckClock;

use crate::audio::{ChunkConsumer, RollingWindow};
use crate::detector::WakeModel;
use crate::error::{DetectorError, PipelineError};
use crate::log_debug;
use crate::pipeline::ShutdownFlag;
use crate::trigger::TriggerController;
use crossbeam_channel::RecvTimeoutError;
use std::time::{Duration, Instant};

/// Floor for the queue wait so an overdue check never turns into a spin.
const MIN_WAIT: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub check_interval: Duration,
    /// Longest the loop blocks on an empty queue.
    pub idle_wake: Duration,
    /// Consecutive detector failures tolerated before giving up.
    pub max_detector_failures: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(1),
            idle_wake: Duration::from_millis(100),
            max_detector_failures: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub chunks_consumed: u64,
    /// Windows handed to the detector.
    pub checks: u64,
    pub skipped_not_ready: u64,
    /// Checks whose scoring took longer than the check interval.
    pub overruns: u64,
    pub detector_failures: u64,
}

pub struct DetectionScheduler {
    consumer: ChunkConsumer,
    window: RollingWindow,
    model: Box<dyn WakeModel>,
    trigger: TriggerController,
    clock: CheckClock,
    config: SchedulerConfig,
    stats: SchedulerStats,
    consecutive_failures: u32,
}

impl DetectionScheduler {
    pub fn new(
        consumer: ChunkConsumer,
        window: RollingWindow,
        model: Box<dyn WakeModel>,
        trigger: TriggerController,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            consumer,
            window,
            model,
            trigger,
            clock: CheckClock::new(config.check_interval),
            config,
            stats: SchedulerStats::default(),
            consecutive_failures: 0,
        }
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    pub fn trigger(&self) -> &TriggerController {
        &self.trigger
    }

    pub fn window(&self) -> &RollingWindow {
        &self.window
    }

    /// Run until shutdown is requested or the capture side goes away.
    ///
    /// When capture ends on its own (a replayed file ran out) any playback
    /// already running is allowed to finish first.
    pub fn run(&mut self, shutdown: &ShutdownFlag) -> Result<SchedulerStats, PipelineError> {
        let result = self.run_loop(shutdown);
        self.trigger.shutdown();
        log_debug(&format!("scheduler stopped: {:?}", self.stats));
        result.map(|()| self.stats)
    }

    fn run_loop(&mut self, shutdown: &ShutdownFlag) -> Result<(), PipelineError> {
        loop {
            if shutdown.is_requested() {
                return Ok(());
            }
            let wait = self.next_wait(Instant::now());
            match self.consumer.recv_timeout(wait) {
                Ok(chunk) => {
                    self.window.append(chunk);
                    self.stats.chunks_consumed += 1;
                    self.drain_queue();
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            self.tick(Instant::now())?;
        }

        while !self.trigger.is_listening() && !shutdown.is_requested() {
            std::thread::sleep(self.config.idle_wake);
            self.trigger.poll(&mut self.window, Instant::now());
        }
        Ok(())
    }

    /// Move every queued chunk into the window without blocking.
    pub(crate) fn drain_queue(&mut self) -> usize {
        let moved = self.consumer.drain_into(&mut self.window);
        self.stats.chunks_consumed += moved as u64;
        moved
    }

    fn next_wait(&self, now: Instant) -> Duration {
        if !self.trigger.is_listening() {
            return self.config.idle_wake;
        }
        self.config
            .idle_wake
            .min(self.clock.remaining(now))
            .max(MIN_WAIT)
    }

    /// Advance the trigger and run a check if one is due.
    pub(crate) fn tick(&mut self, now: Instant) -> Result<(), PipelineError> {
        self.trigger.poll(&mut self.window, now);
        if !self.trigger.is_listening() || !self.clock.is_due(now) {
            return Ok(());
        }
        self.clock.mark(now);
        self.check(now)
    }

    fn check(&mut self, now: Instant) -> Result<(), PipelineError> {
        let clip = match self.window.snapshot() {
            Ok(clip) => clip,
            Err(not_ready) => {
                self.stats.skipped_not_ready += 1;
                tracing::trace!(
                    target: "wakeplay::scheduler",
                    buffered = not_ready.buffered_samples,
                    required = not_ready.required_samples,
                    "window warming up"
                );
                return Ok(());
            }
        };

        self.stats.checks += 1;
        let started = Instant::now();
        let scored = self
            .model
            .reset()
            .and_then(|()| self.model.score_clip(&clip));
        let elapsed = started.elapsed();
        if elapsed > self.config.check_interval {
            self.stats.overruns += 1;
            log_debug(&format!(
                "detection overrun: scoring took {} ms (interval {} ms)",
                elapsed.as_millis(),
                self.config.check_interval.as_millis()
            ));
            tracing::warn!(
                target: "wakeplay::scheduler",
                elapsed_ms = elapsed.as_millis() as u64,
                interval_ms = self.config.check_interval.as_millis() as u64,
                "scoring slower than check interval; detection is falling behind real time"
            );
        }

        let results = match scored {
            Ok(results) => {
                self.consecutive_failures = 0;
                results
            }
            Err(err) => return self.record_failure(err),
        };

        let peak = results
            .iter()
            .filter_map(|r| r.peak())
            .fold(0.0f32, |top, (_, score)| top.max(score));
        tracing::debug!(
            target: "wakeplay::scheduler",
            first_seq = clip.first_seq,
            last_seq = clip.last_seq,
            results = results.len(),
            peak,
            elapsed_ms = elapsed.as_millis() as u64,
            "window scored"
        );

        for result in &results {
            if let Some(trigger) = self.trigger.on_result(result) {
                self.trigger
                    .fire(trigger, &mut self.window, self.model.as_mut(), now);
            }
        }
        Ok(())
    }

    fn record_failure(&mut self, err: DetectorError) -> Result<(), PipelineError> {
        self.consecutive_failures += 1;
        self.stats.detector_failures += 1;
        log_debug(&format!(
            "detector failure {} of {}: {err}",
            self.consecutive_failures, self.config.max_detector_failures
        ));
        tracing::warn!(
            target: "wakeplay::scheduler",
            error = %err,
            consecutive = self.consecutive_failures,
            "detector check failed"
        );
        if self.consecutive_failures > self.config.max_detector_failures {
            return Err(PipelineError::Detector {
                consecutive: self.consecutive_failures,
                last: err,
            });
        }
        Ok(())
    }
}
