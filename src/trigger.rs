//! Trigger state machine: Listening → Triggering → Playing → Cooldown → Listening.
//!
//! Detection results are only evaluated while Listening. Everything that
//! arrives in any other state is counted as suppressed and ignored.

use crate::audio::RollingWindow;
use crate::detector::{DetectionResult, Thresholds, WakeModel};
use crate::log_debug;
use crate::player::{Playback, Player};
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    Listening,
    Triggering,
    Playing,
    Cooldown { until: Instant },
}

/// A qualifying detection, produced by [`TriggerController::on_result`].
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub label: String,
    pub score: f32,
    pub window_end: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerStats {
    pub triggers: u64,
    pub playback_failures: u64,
    /// Results compared against thresholds.
    pub evaluated: u64,
    /// Results ignored because detection was suspended.
    pub suppressed: u64,
}

pub struct TriggerController {
    state: TriggerState,
    thresholds: Thresholds,
    media_path: PathBuf,
    player: Box<dyn Player>,
    playback: Option<Box<dyn Playback>>,
    cooldown: Duration,
    announce: bool,
    stats: TriggerStats,
}

impl TriggerController {
    pub fn new(
        thresholds: Thresholds,
        media_path: PathBuf,
        player: Box<dyn Player>,
        cooldown: Duration,
    ) -> Self {
        Self {
            state: TriggerState::Listening,
            thresholds,
            media_path,
            player,
            playback: None,
            cooldown,
            announce: false,
            stats: TriggerStats::default(),
        }
    }

    /// Print detection and playback status lines to stdout.
    pub fn with_announce(mut self, announce: bool) -> Self {
        self.announce = announce;
        self
    }

    pub fn state(&self) -> TriggerState {
        self.state
    }

    pub fn is_listening(&self) -> bool {
        self.state == TriggerState::Listening
    }

    pub fn stats(&self) -> TriggerStats {
        self.stats
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Evaluate one result. Returns a trigger, and enters Triggering, when a
    /// label clears its threshold while Listening.
    pub fn on_result(&mut self, result: &DetectionResult) -> Option<Trigger> {
        if !self.is_listening() {
            self.stats.suppressed += 1;
            return None;
        }
        self.stats.evaluated += 1;
        let (label, score) = result.best_above(&self.thresholds)?;
        self.state = TriggerState::Triggering;
        Some(Trigger {
            label: label.to_string(),
            score,
            window_end: result.window_end,
        })
    }

    /// Carry out a trigger: drop the buffered audio, reset the model and start
    /// playback. A player that fails to launch goes straight to Cooldown.
    pub fn fire(
        &mut self,
        trigger: Trigger,
        window: &mut RollingWindow,
        model: &mut dyn WakeModel,
        now: Instant,
    ) {
        if self.state != TriggerState::Triggering {
            log_debug(&format!("ignoring trigger outside Triggering: {:?}", self.state));
            return;
        }
        self.stats.triggers += 1;
        window.clear();
        if let Err(err) = model.reset() {
            log_debug(&format!("detector reset after trigger failed: {err}"));
        }
        tracing::info!(
            target: "wakeplay::trigger",
            label = %trigger.label,
            score = trigger.score,
            window_end_ms = trigger.window_end.as_millis() as u64,
            "wake phrase detected"
        );
        if self.announce {
            println!(
                "Wake word '{}' detected (score {:.2}), playing {}",
                trigger.label,
                trigger.score,
                self.media_path.display()
            );
        }

        match self.player.start(&self.media_path) {
            Ok(playback) => {
                self.playback = Some(playback);
                self.state = TriggerState::Playing;
            }
            Err(err) => {
                self.stats.playback_failures += 1;
                log_debug(&format!("player launch failed: {err}"));
                tracing::warn!(target: "wakeplay::trigger", error = %err, "playback failed to start");
                if self.announce {
                    eprintln!("Playback failed: {err}");
                }
                window.clear();
                self.enter_cooldown(now);
            }
        }
    }

    /// Advance Playing and Cooldown. Call on every scheduler iteration.
    pub fn poll(&mut self, window: &mut RollingWindow, now: Instant) {
        match self.state {
            TriggerState::Playing => {
                let Some(playback) = self.playback.as_mut() else {
                    window.clear();
                    self.enter_cooldown(now);
                    return;
                };
                match playback.try_wait() {
                    Ok(None) => return,
                    Ok(Some(outcome)) => {
                        tracing::info!(
                            target: "wakeplay::trigger",
                            elapsed_ms = outcome.elapsed.as_millis() as u64,
                            "playback finished"
                        );
                    }
                    Err(err) => {
                        self.stats.playback_failures += 1;
                        log_debug(&format!("player failed: {err}"));
                        tracing::warn!(target: "wakeplay::trigger", error = %err, "playback failed");
                    }
                }
                self.playback = None;
                // Audio captured during playback may hold the video's own
                // sound or an echo of the phrase.
                window.clear();
                self.enter_cooldown(now);
            }
            TriggerState::Cooldown { until } if now >= until => {
                self.state = TriggerState::Listening;
                log_debug("trigger: listening");
                if self.announce {
                    println!("Listening...");
                }
            }
            _ => {}
        }
    }

    /// Stop any running playback.
    pub fn shutdown(&mut self) {
        if let Some(mut playback) = self.playback.take() {
            playback.stop();
        }
    }

    fn enter_cooldown(&mut self, now: Instant) {
        self.state = TriggerState::Cooldown {
            until: now + self.cooldown,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioChunk, Clip};
    use crate::error::{DetectorError, PlayerError};
    use crate::player::PlayOutcome;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct FakePlayer {
        started: Arc<Mutex<Vec<PathBuf>>>,
        done: Arc<AtomicBool>,
        fail_launch: bool,
        exit_code: i32,
    }

    struct FakePlayback {
        done: Arc<AtomicBool>,
        exit_code: i32,
    }

    impl Player for FakePlayer {
        fn start(&self, path: &Path) -> Result<Box<dyn Playback>, PlayerError> {
            if self.fail_launch {
                return Err(PlayerError::Launch {
                    command: "fake".into(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
                });
            }
            self.started.lock().unwrap().push(path.to_path_buf());
            Ok(Box::new(FakePlayback {
                done: self.done.clone(),
                exit_code: self.exit_code,
            }))
        }
    }

    impl Playback for FakePlayback {
        fn try_wait(&mut self) -> Result<Option<PlayOutcome>, PlayerError> {
            #[cfg(unix)]
            if self.exit_code != 0 && self.done.load(Ordering::SeqCst) {
                use std::os::unix::process::ExitStatusExt;
                return Err(PlayerError::Failed(std::process::ExitStatus::from_raw(
                    self.exit_code << 8,
                )));
            }
            Ok(self.done.load(Ordering::SeqCst).then_some(PlayOutcome {
                elapsed: Duration::from_millis(10),
            }))
        }

        fn stop(&mut self) {}
    }

    #[derive(Default)]
    struct CountingModel {
        resets: Arc<AtomicUsize>,
    }

    impl WakeModel for CountingModel {
        fn reset(&mut self) -> Result<(), DetectorError> {
            self.resets.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn score_chunk(&mut self, _: &AudioChunk) -> Result<DetectionResult, DetectorError> {
            Ok(DetectionResult::default())
        }

        fn score_clip(&mut self, _: &Clip) -> Result<Vec<DetectionResult>, DetectorError> {
            Ok(Vec::new())
        }

        fn labels(&self) -> Vec<String> {
            vec!["wake".into()]
        }
    }

    fn wake(score: f32) -> DetectionResult {
        DetectionResult::new(
            [("wake".to_string(), score)].into_iter().collect(),
            Duration::from_secs(5),
        )
    }

    fn filled_window() -> RollingWindow {
        let mut window = RollingWindow::new(12_800, 1_280);
        for seq in 0..4 {
            window.append(AudioChunk::new(seq, vec![0; 1280], 1280).unwrap());
        }
        window
    }

    fn controller(player: &FakePlayer) -> TriggerController {
        TriggerController::new(
            Thresholds::new(0.5),
            PathBuf::from("video.mp4"),
            Box::new(player.clone()),
            Duration::from_secs(1),
        )
    }

    #[test]
    fn below_threshold_stays_listening() {
        let player = FakePlayer::default();
        let mut trigger = controller(&player);
        assert!(trigger.on_result(&wake(0.3)).is_none());
        assert!(trigger.is_listening());
        assert_eq!(trigger.stats().evaluated, 1);
    }

    #[test]
    fn full_cycle_returns_to_listening() {
        let player = FakePlayer::default();
        let mut trigger = controller(&player);
        let mut window = filled_window();
        let mut model = CountingModel::default();
        let t0 = Instant::now();

        let hit = trigger.on_result(&wake(0.9)).expect("trigger");
        assert_eq!(hit.label, "wake");
        assert_eq!(trigger.state(), TriggerState::Triggering);

        trigger.fire(hit, &mut window, &mut model, t0);
        assert_eq!(trigger.state(), TriggerState::Playing);
        assert!(window.is_empty());
        assert_eq!(model.resets.load(Ordering::SeqCst), 1);
        assert_eq!(*player.started.lock().unwrap(), vec![PathBuf::from("video.mp4")]);

        window.append(AudioChunk::new(10, vec![1; 1280], 1280).unwrap());
        trigger.poll(&mut window, t0);
        assert_eq!(trigger.state(), TriggerState::Playing);
        assert_eq!(window.len(), 1);

        player.done.store(true, Ordering::SeqCst);
        let ended = t0 + Duration::from_secs(3);
        trigger.poll(&mut window, ended);
        assert!(window.is_empty());
        assert_eq!(
            trigger.state(),
            TriggerState::Cooldown {
                until: ended + Duration::from_secs(1)
            }
        );

        trigger.poll(&mut window, ended + Duration::from_millis(500));
        assert!(!trigger.is_listening());
        trigger.poll(&mut window, ended + Duration::from_secs(1));
        assert!(trigger.is_listening());
    }

    #[test]
    fn results_during_playback_are_suppressed() {
        let player = FakePlayer::default();
        let mut trigger = controller(&player);
        let mut window = filled_window();
        let mut model = CountingModel::default();
        let hit = trigger.on_result(&wake(0.9)).expect("trigger");
        trigger.fire(hit, &mut window, &mut model, Instant::now());

        for _ in 0..5 {
            assert!(trigger.on_result(&wake(0.99)).is_none());
        }
        assert_eq!(trigger.stats().suppressed, 5);
        assert_eq!(player.started.lock().unwrap().len(), 1);
    }

    #[test]
    fn launch_failure_goes_to_cooldown() {
        let player = FakePlayer {
            fail_launch: true,
            ..FakePlayer::default()
        };
        let mut trigger = controller(&player);
        let mut window = filled_window();
        let mut model = CountingModel::default();
        let now = Instant::now();
        let hit = trigger.on_result(&wake(0.9)).expect("trigger");
        trigger.fire(hit, &mut window, &mut model, now);
        assert_eq!(
            trigger.state(),
            TriggerState::Cooldown {
                until: now + Duration::from_secs(1)
            }
        );
        assert_eq!(trigger.stats().playback_failures, 1);
        assert_eq!(trigger.stats().triggers, 1);
    }

    #[cfg(unix)]
    #[test]
    fn player_exiting_non_zero_still_cools_down_and_listens() {
        let player = FakePlayer {
            exit_code: 2,
            ..FakePlayer::default()
        };
        let mut trigger = controller(&player);
        let mut window = filled_window();
        let mut model = CountingModel::default();
        let t0 = Instant::now();
        let hit = trigger.on_result(&wake(0.9)).expect("trigger");
        trigger.fire(hit, &mut window, &mut model, t0);
        assert_eq!(trigger.state(), TriggerState::Playing);

        window.append(AudioChunk::new(10, vec![1; 1280], 1280).unwrap());
        player.done.store(true, Ordering::SeqCst);
        let ended = t0 + Duration::from_secs(2);
        trigger.poll(&mut window, ended);
        assert!(window.is_empty());
        assert_eq!(
            trigger.state(),
            TriggerState::Cooldown {
                until: ended + Duration::from_secs(1)
            }
        );
        assert_eq!(trigger.stats().playback_failures, 1);

        trigger.poll(&mut window, ended + Duration::from_secs(1));
        assert!(trigger.is_listening());
        assert!(trigger.on_result(&wake(0.9)).is_some());
    }
}
