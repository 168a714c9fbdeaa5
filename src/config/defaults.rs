pub const DEFAULT_MODELS: &str = "hey_jarvis";
pub const DEFAULT_MEDIA_PATH: &str = "./video.mp4";
pub const DEFAULT_THRESHOLD: f32 = 0.5;
pub const DEFAULT_WINDOW_MS: u64 = 5_000;
pub const DEFAULT_CHECK_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
pub const DEFAULT_FRAME_SAMPLES: usize = 1_280;
pub const DEFAULT_MAX_DETECTOR_FAILURES: u32 = 5;
pub const DEFAULT_DETECTOR_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_IDLE_WAKE_MS: u64 = 100;
pub const DEFAULT_DEBUG_DIR: &str = "./debug_recordings";
pub const DEFAULT_DEBUG_FILES: usize = 10;
pub const DEFAULT_DEBUG_FILE_SECS: u64 = 5;
pub const DEFAULT_MIC_CHECK_SECS: u64 = 5;
pub const DEFAULT_MIC_CHECK_OUTPUT: &str = "test_recording.wav";

pub(super) const MIN_WINDOW_MS: u64 = 500;
pub(super) const MAX_WINDOW_MS: u64 = 60_000;
pub(super) const MIN_CHECK_INTERVAL_MS: u64 = 100;
pub(super) const MAX_CHECK_INTERVAL_MS: u64 = 60_000;
pub(super) const MIN_QUEUE_CAPACITY: usize = 8;
pub(super) const MAX_QUEUE_CAPACITY: usize = 4_096;
pub(super) const MIN_FRAME_SAMPLES: usize = 160;
pub(super) const MAX_FRAME_SAMPLES: usize = 16_000;
pub(super) const MAX_DEBUG_FILES: usize = 1_000;
pub(super) const MAX_DEBUG_FILE_SECS: u64 = 600;
pub(super) const MAX_MIC_CHECK_SECS: u64 = 60;
pub(super) const MAX_HELPER_ARGS: usize = 32;

pub(super) const PLAYER_ALLOWLIST: &[&str] = &["mpv", "vlc", "cvlc", "ffplay"];
pub(super) const DETECTOR_ALLOWLIST: &[&str] = &["python3", "python"];
pub(super) const DEFAULT_DETECTOR_SCRIPT: &str =
    concat!(env!("CARGO_MANIFEST_DIR"), "/scripts/wake_detector.py");
