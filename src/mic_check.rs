//! Microphone check: record a few seconds, save them, report levels.

use crate::audio::{level_stats, AudioSource, LevelStats, LevelVerdict, Recorder, TARGET_RATE};
use crate::debug_recorder::write_wav;
use crate::error::DeviceError;
use crate::log_debug;
use anyhow::{Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct MicCheckReport {
    pub device: String,
    pub path: PathBuf,
    pub duration: Duration,
    pub levels: LevelStats,
}

impl MicCheckReport {
    pub fn verdict(&self) -> LevelVerdict {
        self.levels.verdict()
    }
}

/// Pull `duration` worth of chunks from `source`.
pub fn record_for(source: &mut dyn AudioSource, duration: Duration) -> Result<Vec<i16>, DeviceError> {
    let wanted = (duration.as_millis() as u64 * u64::from(TARGET_RATE) / 1000) as usize;
    let mut samples = Vec::with_capacity(wanted);
    while samples.len() < wanted {
        match source.read_chunk() {
            Ok(chunk) => samples.extend_from_slice(chunk.samples()),
            Err(err) if err.is_end_of_stream() => break,
            Err(err) => return Err(err),
        }
    }
    samples.truncate(wanted);
    Ok(samples)
}

pub fn run_mic_check(
    device: Option<&str>,
    duration: Duration,
    frame_samples: usize,
    output: &Path,
) -> Result<MicCheckReport> {
    let recorder = Recorder::new(device)?;
    let device_name = recorder.device_name().to_string();
    println!("Recording {} seconds from '{device_name}'...", duration.as_secs());
    let mut source = recorder.open_stream(frame_samples)?;
    let samples = record_for(&mut source, duration)?;
    drop(source);

    write_wav(output, &samples)
        .with_context(|| format!("failed to save recording to '{}'", output.display()))?;
    let levels = level_stats(&samples);
    log_debug(&format!(
        "mic check: device='{device_name}' samples={} avg={:.1} peak={}",
        samples.len(),
        levels.average_amplitude,
        levels.peak_amplitude
    ));
    Ok(MicCheckReport {
        device: device_name,
        path: output.to_path_buf(),
        duration,
        levels,
    })
}

impl fmt::Display for MicCheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Saved recording to {}", self.path.display())?;
        writeln!(f, "You can play it with: mpv {}", self.path.display())?;
        writeln!(f)?;
        writeln!(f, "Audio levels:")?;
        writeln!(f, "  Average amplitude: {:.1}", self.levels.average_amplitude)?;
        writeln!(f, "  Maximum amplitude: {}", self.levels.peak_amplitude)?;
        writeln!(f, "  RMS level: {:.1} dBFS", self.levels.rms_db)?;
        writeln!(f, "  Max possible: 32768")?;
        match self.verdict() {
            LevelVerdict::TooQuiet => {
                writeln!(f, "WARNING: audio level is very low. Check your microphone.")
            }
            LevelVerdict::TooLoud => {
                writeln!(f, "WARNING: audio level is very high. You might get distortion.")
            }
            LevelVerdict::Ok => writeln!(f, "Audio levels look good!"),
        }
    }
}
