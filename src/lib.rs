//! Wake-phrase listener: captures microphone audio, scores a rolling window
//! against a wake-phrase model on a fixed schedule, and plays a video when
//! the phrase is heard.

pub mod app;
pub mod audio;
pub mod config;
pub mod debug_recorder;
pub mod detector;
pub mod error;
mod lock;
pub mod mic_check;
pub mod pipeline;
pub mod player;
pub mod scan;
pub mod scheduler;
pub mod telemetry;
pub mod trigger;

pub use app::logging::{crash_log_path, init_logging, log_debug, log_file_path, log_panic};
pub(crate) use lock::lock_or_recover;
pub use pipeline::{Pipeline, PipelineConfig, PipelineReport, ShutdownFlag};
