//! Debug and crash logs for long unattended listening sessions.
//!
//! `wakeplay.log` collects the pipeline's own diagnostics: capture drops,
//! warm-up skips, detector failures, trigger transitions and recorder writes.
//! Each run starts with a header describing the listening setup so a log
//! handed over after a missed detection explains itself. Both files live in
//! the temp dir, are capped in size, and stay off unless `--logs` or
//! `--log-timings` is given.

use crate::config::AppConfig;
use std::{
    env, fs,
    io::{self, Write},
    panic,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, MutexGuard, OnceLock,
    },
    thread,
    time::{SystemTime, UNIX_EPOCH},
};

/// A multi-day session at one line per check stays well under this.
const LOG_MAX_BYTES: u64 = 5 * 1024 * 1024;
const CRASH_LOG_MAX_BYTES: u64 = 256 * 1024;

static LOG_ENABLED: AtomicBool = AtomicBool::new(false);
static SESSION_LOG: OnceLock<Mutex<Option<CappedFile>>> = OnceLock::new();

pub fn log_file_path() -> PathBuf {
    env::temp_dir().join("wakeplay.log")
}

pub fn crash_log_path() -> PathBuf {
    env::temp_dir().join("wakeplay_crash.log")
}

/// Append-only file that starts over once it would pass `cap` bytes.
struct CappedFile {
    path: PathBuf,
    file: fs::File,
    cap: u64,
    len: u64,
}

impl CappedFile {
    fn open(path: &Path, cap: u64) -> io::Result<Self> {
        let existing = fs::metadata(path).map(|meta| meta.len()).unwrap_or(0);
        let mut options = fs::OpenOptions::new();
        options.create(true);
        // An oversized leftover from an earlier run is not worth keeping.
        let len = if existing > cap {
            options.write(true).truncate(true);
            0
        } else {
            options.append(true);
            existing
        };
        Ok(Self {
            path: path.to_path_buf(),
            file: options.open(path)?,
            cap,
            len,
        })
    }

    fn append(&mut self, line: &str) {
        let incoming = line.len() as u64;
        if self.len.saturating_add(incoming) > self.cap {
            match fs::File::create(&self.path) {
                Ok(file) => {
                    self.file = file;
                    self.len = 0;
                }
                Err(_) => return,
            }
        }
        if self.file.write_all(line.as_bytes()).is_ok() {
            self.len = self.len.saturating_add(incoming);
        }
    }
}

/// Recovers from poisoning inline; routing through `lock_or_recover` would
/// log while holding this very lock.
fn session_log() -> MutexGuard<'static, Option<CappedFile>> {
    SESSION_LOG
        .get_or_init(|| Mutex::new(None))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn set_enabled(enabled: bool) {
    LOG_ENABLED.store(enabled, Ordering::Relaxed);
    *session_log() = if enabled {
        CappedFile::open(&log_file_path(), LOG_MAX_BYTES).ok()
    } else {
        None
    };
}

/// `--logs`/`--log-timings` turn file logs on; `--no-logs` always wins.
pub(crate) fn logging_enabled(config: &AppConfig) -> bool {
    (config.logs || config.log_timings) && !config.no_logs
}

/// Open (or skip) the session log and write the run header.
pub fn init_logging(config: &AppConfig) {
    set_enabled(logging_enabled(config));
    if LOG_ENABLED.load(Ordering::Relaxed) {
        log_debug(&session_header(config));
    }
}

/// One line summarizing what this run listens for and what it plays.
pub(crate) fn session_header(config: &AppConfig) -> String {
    let input = match (&config.input_wav, &config.input_device) {
        (Some(wav), _) => format!("wav:{}", wav.display()),
        (None, Some(device)) => format!("device:{device}"),
        (None, None) => "device:auto".to_string(),
    };
    format!(
        "=== wakeplay v{} session: model={} threshold={} window={}ms interval={}ms input={} media={} ===",
        env!("CARGO_PKG_VERSION"),
        config.model_ref(),
        config.threshold,
        config.window_ms,
        config.check_interval_ms,
        input,
        config.media_path.display()
    )
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

fn thread_label() -> String {
    thread::current().name().unwrap_or("unnamed").to_string()
}

/// `[unix ms] [thread] message`. Cheap no-op while logging is off, so the
/// capture and scheduler threads can call it freely.
pub fn log_debug(msg: &str) {
    if !LOG_ENABLED.load(Ordering::Relaxed) {
        return;
    }
    let line = format!("[{}] [{}] {msg}\n", unix_millis(), thread_label());
    if let Some(file) = session_log().as_mut() {
        file.append(&line);
    }
}

/// Record which worker panicked and where. A panic in the capture or
/// recorder thread otherwise only shows up as a bare exit code.
pub fn log_panic(info: &panic::PanicHookInfo<'_>) {
    if !LOG_ENABLED.load(Ordering::Relaxed) {
        return;
    }
    let location = info
        .location()
        .map(|loc| format!("{}:{}", loc.file(), loc.line()))
        .unwrap_or_else(|| "unknown".to_string());
    let payload = info
        .payload()
        .downcast_ref::<&str>()
        .map(|text| (*text).to_string())
        .or_else(|| info.payload().downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    let line = format!(
        "[{}] panic in thread '{}' at {location}: {payload} (v{})\n",
        unix_millis(),
        thread_label(),
        env!("CARGO_PKG_VERSION")
    );
    if let Ok(mut file) = CappedFile::open(&crash_log_path(), CRASH_LOG_MAX_BYTES) {
        file.append(&line);
    }
}

#[cfg(test)]
pub(crate) fn set_logging_for_tests(enabled: bool) {
    set_enabled(enabled);
}
