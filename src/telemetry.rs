//! Structured JSON trace events alongside the plain debug log.

use crate::app::logging::logging_enabled;
use crate::config::AppConfig;
use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing_subscriber::fmt::time::UtcTime;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// `WAKEPLAY_TRACE_LOG` if set, else `wakeplay_trace.jsonl` in the temp dir.
pub fn tracing_log_path() -> PathBuf {
    env::var("WAKEPLAY_TRACE_LOG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| env::temp_dir().join("wakeplay_trace.jsonl"))
}

/// Install the global JSON subscriber once, when file logging is enabled.
pub fn init_tracing(config: &AppConfig) {
    if !logging_enabled(config) {
        return;
    }

    let _ = TRACING_INIT.get_or_init(|| {
        let path = tracing_log_path();
        let file = match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => file,
            Err(err) => {
                crate::log_debug(&format!(
                    "trace log '{}' unavailable: {err}",
                    path.display()
                ));
                return;
            }
        };
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_timer(UtcTime::rfc_3339())
            .with_thread_names(true)
            .with_target(true)
            .with_writer(file)
            .with_current_span(false)
            .with_span_list(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}
