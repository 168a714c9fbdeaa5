use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use wakeplay::{log_debug, ShutdownFlag};

/// Set by the SIGINT/SIGTERM handler.
static STOP_REQUESTED: AtomicBool = AtomicBool::new(false);

const WATCH_INTERVAL: Duration = Duration::from_millis(50);

/// Only touches an atomic, which is async-signal-safe.
extern "C" fn handle_stop_signal(_: libc::c_int) {
    STOP_REQUESTED.store(true, Ordering::SeqCst);
}

pub(crate) fn install_stop_handlers() -> Result<()> {
    for (signal, name) in [(libc::SIGINT, "SIGINT"), (libc::SIGTERM, "SIGTERM")] {
        unsafe {
            // SAFETY: handle_stop_signal is an extern "C" handler that only
            // stores to a static atomic.
            let handler = handle_stop_signal as *const () as libc::sighandler_t;
            if libc::signal(signal, handler) == libc::SIG_ERR {
                log_debug(&format!("failed to install {name} handler"));
                return Err(anyhow!("failed to install {name} handler"));
            }
        }
    }
    Ok(())
}

/// Forward a caught signal to the pipeline's shutdown flag.
pub(crate) fn spawn_signal_watcher(shutdown: ShutdownFlag) -> Result<()> {
    thread::Builder::new()
        .name("wakeplay-signals".to_string())
        .spawn(move || {
            while !shutdown.is_requested() {
                if STOP_REQUESTED.swap(false, Ordering::SeqCst) {
                    log_debug("stop signal received");
                    shutdown.request();
                    break;
                }
                thread::sleep(WATCH_INTERVAL);
            }
        })?;
    Ok(())
}
