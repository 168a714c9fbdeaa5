//! Media player boundary.
//!
//! Playback is started as a child process and watched from the scheduler
//! loop, so the chunk queue keeps draining while the video runs.

use crate::error::PlayerError;
use crate::log_debug;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// How often [`play_blocking`] checks on a running playback.
const BLOCKING_POLL: Duration = Duration::from_millis(50);

/// Successful end of playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayOutcome {
    pub elapsed: Duration,
}

/// Something that can play a media file.
pub trait Player: Send {
    fn start(&self, path: &Path) -> Result<Box<dyn Playback>, PlayerError>;
}

/// A playback in progress.
pub trait Playback: Send {
    /// `Ok(None)` while still playing. A non-zero exit is an error.
    fn try_wait(&mut self) -> Result<Option<PlayOutcome>, PlayerError>;

    /// Abort playback. Safe to call after it already ended.
    fn stop(&mut self);
}

/// Play `path` to completion on the calling thread.
pub fn play_blocking(player: &dyn Player, path: &Path) -> Result<PlayOutcome, PlayerError> {
    let mut playback = player.start(path)?;
    loop {
        if let Some(outcome) = playback.try_wait()? {
            return Ok(outcome);
        }
        thread::sleep(BLOCKING_POLL);
    }
}

/// Runs an external player binary with the media path appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPlayer {
    program: String,
    args: Vec<String>,
}

impl CommandPlayer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Fullscreen mpv with its terminal output silenced.
    pub fn mpv() -> Self {
        Self::new(
            "mpv",
            ["--fs", "--really-quiet", "--no-terminal"]
                .iter()
                .map(|arg| arg.to_string())
                .collect(),
        )
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn command_line(&self, path: &Path) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        parts.push(path.display().to_string());
        shell_words::join(parts)
    }
}

impl Player for CommandPlayer {
    fn start(&self, path: &Path) -> Result<Box<dyn Playback>, PlayerError> {
        let command_line = self.command_line(path);
        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| PlayerError::Launch {
                command: command_line.clone(),
                source,
            })?;
        log_debug(&format!("player started (pid {}): {command_line}", child.id()));
        Ok(Box::new(ChildPlayback {
            child,
            started: Instant::now(),
            finished: false,
        }))
    }
}

struct ChildPlayback {
    child: Child,
    started: Instant,
    finished: bool,
}

impl Playback for ChildPlayback {
    fn try_wait(&mut self) -> Result<Option<PlayOutcome>, PlayerError> {
        let Some(status) = self.child.try_wait().map_err(PlayerError::Wait)? else {
            return Ok(None);
        };
        self.finished = true;
        if status.success() {
            Ok(Some(PlayOutcome {
                elapsed: self.started.elapsed(),
            }))
        } else {
            Err(PlayerError::Failed(status))
        }
    }

    fn stop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(err) = self.child.kill() {
            log_debug(&format!("failed to stop player: {err}"));
        }
        let _ = self.child.wait();
        self.finished = true;
    }
}

impl Drop for ChildPlayback {
    fn drop(&mut self) {
        self.stop();
    }
}
