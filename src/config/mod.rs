//! Command-line parsing and validation helpers.

mod defaults;
mod validation;

use clap::{ArgAction, Parser};
use std::path::PathBuf;

use defaults::DEFAULT_DETECTOR_SCRIPT;
pub use defaults::{
    DEFAULT_CHECK_INTERVAL_MS, DEFAULT_DEBUG_DIR, DEFAULT_DEBUG_FILES, DEFAULT_DEBUG_FILE_SECS,
    DEFAULT_DETECTOR_TIMEOUT_MS, DEFAULT_FRAME_SAMPLES, DEFAULT_IDLE_WAKE_MS,
    DEFAULT_MAX_DETECTOR_FAILURES, DEFAULT_MEDIA_PATH, DEFAULT_MIC_CHECK_OUTPUT,
    DEFAULT_MIC_CHECK_SECS, DEFAULT_MODELS, DEFAULT_QUEUE_CAPACITY, DEFAULT_THRESHOLD,
    DEFAULT_WINDOW_MS,
};

/// CLI options for wakeplay. Validated values keep downstream subprocesses safe.
#[derive(Debug, Parser, Clone)]
#[command(
    name = "wakeplay",
    about = "Listen for a wake phrase and play a video when it is heard",
    author,
    version
)]
pub struct AppConfig {
    /// Comma-separated built-in wake-phrase models
    #[arg(long, env = "WAKE_WORD_MODELS", default_value = DEFAULT_MODELS)]
    pub models: String,

    /// Custom model file (takes precedence over --models)
    #[arg(long = "model-path", env = "CUSTOM_MODEL_PATH")]
    pub model_path: Option<PathBuf>,

    /// Media file played on detection
    #[arg(long = "media-path", env = "VIDEO_PATH", default_value = DEFAULT_MEDIA_PATH)]
    pub media_path: PathBuf,

    /// Refuse to start when the media file is missing
    #[arg(long = "require-media", action = ArgAction::Set, default_value_t = true)]
    pub require_media: bool,

    /// Detection threshold applied to every label
    #[arg(long, env = "THRESHOLD", default_value_t = DEFAULT_THRESHOLD)]
    pub threshold: f32,

    /// Per-label threshold override, LABEL=VALUE (repeatable)
    #[arg(long = "label-threshold", action = ArgAction::Append, value_name = "LABEL=VALUE")]
    pub label_thresholds: Vec<String>,

    /// Audio input device name (exact or substring); defaults to a "USB PnP"
    /// microphone when one is plugged in, else the system default
    #[arg(long)]
    pub input_device: Option<String>,

    /// Replay a WAV file instead of capturing from a microphone
    #[arg(long = "input-wav")]
    pub input_wav: Option<PathBuf>,

    /// Replay --input-wav as fast as possible instead of in real time
    #[arg(long = "no-pace", default_value_t = false)]
    pub no_pace: bool,

    /// Print detected audio input devices and exit
    #[arg(long = "list-input-devices", default_value_t = false)]
    pub list_input_devices: bool,

    /// Record a short test clip, report levels, and exit
    #[arg(long = "mic-check", default_value_t = false)]
    pub mic_check: bool,

    /// Mic check recording length (seconds)
    #[arg(long = "mic-check-secs", default_value_t = DEFAULT_MIC_CHECK_SECS)]
    pub mic_check_secs: u64,

    /// Where the mic check recording is saved
    #[arg(long = "mic-check-output", default_value = DEFAULT_MIC_CHECK_OUTPUT)]
    pub mic_check_output: PathBuf,

    /// Scan a WAV file for wake phrases, print the events, and exit
    #[arg(long = "scan-wav")]
    pub scan_wav: Option<PathBuf>,

    /// Audio kept in the rolling detection window (milliseconds)
    #[arg(long = "window-ms", default_value_t = DEFAULT_WINDOW_MS)]
    pub window_ms: u64,

    /// Audio required before the first check (milliseconds, defaults to --window-ms)
    #[arg(long = "min-fill-ms")]
    pub min_fill_ms: Option<u64>,

    /// Time between detection checks (milliseconds)
    #[arg(long = "check-interval-ms", default_value_t = DEFAULT_CHECK_INTERVAL_MS)]
    pub check_interval_ms: u64,

    /// Quiet period after playback (milliseconds, defaults to --check-interval-ms)
    #[arg(long = "cooldown-ms")]
    pub cooldown_ms: Option<u64>,

    /// Chunks buffered between capture and detection
    #[arg(long = "queue-capacity", default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// Samples per captured chunk at 16 kHz
    #[arg(long = "frame-samples", default_value_t = DEFAULT_FRAME_SAMPLES)]
    pub frame_samples: usize,

    /// Consecutive detector failures tolerated before giving up
    #[arg(
        long = "max-detector-failures",
        default_value_t = DEFAULT_MAX_DETECTOR_FAILURES
    )]
    pub max_detector_failures: u32,

    /// Keep rolling WAV recordings of captured audio
    #[arg(
        long = "debug-recording",
        env = "ENABLE_DEBUG_RECORDING",
        default_value_t = false
    )]
    pub debug_recording: bool,

    /// Directory for debug recordings
    #[arg(long = "debug-dir", default_value = DEFAULT_DEBUG_DIR)]
    pub debug_dir: PathBuf,

    /// Number of rolling debug recording files
    #[arg(long = "debug-files", default_value_t = DEFAULT_DEBUG_FILES)]
    pub debug_files: usize,

    /// Length of each debug recording (seconds)
    #[arg(long = "debug-file-secs", default_value_t = DEFAULT_DEBUG_FILE_SECS)]
    pub debug_file_secs: u64,

    /// Media player binary
    #[arg(long = "player-cmd", env = "WAKEPLAY_PLAYER", default_value = "mpv")]
    pub player_cmd: String,

    /// Extra player arguments, shell-quoted (repeatable; replaces the mpv defaults)
    #[arg(long = "player-arg", action = ArgAction::Append, value_name = "ARGS")]
    pub player_args: Vec<String>,

    /// Interpreter used for the detector helper
    #[arg(long = "detector-cmd", default_value = "python3")]
    pub detector_cmd: String,

    /// Detector helper script
    #[arg(long = "detector-script", default_value = DEFAULT_DETECTOR_SCRIPT)]
    pub detector_script: PathBuf,

    /// Extra argument passed to the detector helper (repeatable)
    #[arg(
        long = "detector-arg",
        action = ArgAction::Append,
        value_name = "ARG",
        allow_hyphen_values = true
    )]
    pub detector_args: Vec<String>,

    /// Longest wait for a detector reply (milliseconds)
    #[arg(
        long = "detector-timeout-ms",
        default_value_t = DEFAULT_DETECTOR_TIMEOUT_MS
    )]
    pub detector_timeout_ms: u64,

    /// Suppress status lines on stdout
    #[arg(long, default_value_t = false)]
    pub quiet: bool,

    /// Enable file logging (debug)
    #[arg(long = "logs", env = "WAKEPLAY_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all file logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "WAKEPLAY_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Enable verbose timing logs
    #[arg(long)]
    pub log_timings: bool,

    /// Parsed --label-threshold values, filled in by `validate`.
    #[arg(skip)]
    pub(crate) label_overrides: Vec<(String, f32)>,
}
