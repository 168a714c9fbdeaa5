use super::defaults::{
    DETECTOR_ALLOWLIST, MAX_CHECK_INTERVAL_MS, MAX_DEBUG_FILES, MAX_DEBUG_FILE_SECS,
    MAX_FRAME_SAMPLES, MAX_MIC_CHECK_SECS, MAX_HELPER_ARGS, MAX_QUEUE_CAPACITY, MAX_WINDOW_MS,
    MIN_CHECK_INTERVAL_MS, MIN_FRAME_SAMPLES, MIN_QUEUE_CAPACITY, MIN_WINDOW_MS,
    PLAYER_ALLOWLIST,
};
use super::{AppConfig, DEFAULT_IDLE_WAKE_MS};
use crate::debug_recorder::RecorderConfig;
use crate::detector::{DetectorCommand, ModelRef, Thresholds};
use crate::pipeline::PipelineConfig;
use crate::player::CommandPlayer;
use anyhow::{anyhow, bail, Context, Result};
use std::{fs, path::Path, time::Duration};

impl AppConfig {
    /// Check CLI values and normalize binaries.
    pub fn validate(&mut self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            bail!(
                "--threshold must be between 0.0 and 1.0, got {}",
                self.threshold
            );
        }
        self.label_overrides = self
            .label_thresholds
            .iter()
            .map(|raw| parse_label_threshold(raw))
            .collect::<Result<_>>()?;

        if !(MIN_WINDOW_MS..=MAX_WINDOW_MS).contains(&self.window_ms) {
            bail!(
                "--window-ms must be between {MIN_WINDOW_MS} and {MAX_WINDOW_MS}, got {}",
                self.window_ms
            );
        }
        if let Some(min_fill) = self.min_fill_ms {
            if min_fill == 0 || min_fill > self.window_ms {
                bail!(
                    "--min-fill-ms must be between 1 and --window-ms ({}), got {min_fill}",
                    self.window_ms
                );
            }
        }
        if !(MIN_CHECK_INTERVAL_MS..=MAX_CHECK_INTERVAL_MS).contains(&self.check_interval_ms) {
            bail!(
                "--check-interval-ms must be between {MIN_CHECK_INTERVAL_MS} and {MAX_CHECK_INTERVAL_MS}, got {}",
                self.check_interval_ms
            );
        }
        if let Some(cooldown) = self.cooldown_ms {
            if cooldown > MAX_CHECK_INTERVAL_MS {
                bail!("--cooldown-ms must be at most {MAX_CHECK_INTERVAL_MS}, got {cooldown}");
            }
        }
        if !(MIN_QUEUE_CAPACITY..=MAX_QUEUE_CAPACITY).contains(&self.queue_capacity) {
            bail!(
                "--queue-capacity must be between {MIN_QUEUE_CAPACITY} and {MAX_QUEUE_CAPACITY}, got {}",
                self.queue_capacity
            );
        }
        if !(MIN_FRAME_SAMPLES..=MAX_FRAME_SAMPLES).contains(&self.frame_samples) {
            bail!(
                "--frame-samples must be between {MIN_FRAME_SAMPLES} and {MAX_FRAME_SAMPLES}, got {}",
                self.frame_samples
            );
        }
        let frame_ms = self.frame_samples as u64 * 1000 / u64::from(crate::audio::TARGET_RATE);
        if frame_ms > self.window_ms {
            bail!(
                "--frame-samples ({frame_ms} ms) must fit inside --window-ms ({})",
                self.window_ms
            );
        }
        if self.max_detector_failures == 0 {
            bail!("--max-detector-failures must be at least 1");
        }
        if self.detector_timeout_ms == 0 {
            bail!("--detector-timeout-ms must be at least 1");
        }
        if !(1..=MAX_DEBUG_FILES).contains(&self.debug_files) {
            bail!(
                "--debug-files must be between 1 and {MAX_DEBUG_FILES}, got {}",
                self.debug_files
            );
        }
        if !(1..=MAX_DEBUG_FILE_SECS).contains(&self.debug_file_secs) {
            bail!(
                "--debug-file-secs must be between 1 and {MAX_DEBUG_FILE_SECS}, got {}",
                self.debug_file_secs
            );
        }
        if !(1..=MAX_MIC_CHECK_SECS).contains(&self.mic_check_secs) {
            bail!(
                "--mic-check-secs must be between 1 and {MAX_MIC_CHECK_SECS}, got {}",
                self.mic_check_secs
            );
        }

        if self.model_path.is_none() && model_names(&self.models).is_empty() {
            bail!("--models must name at least one model");
        }
        for name in model_names(&self.models) {
            if !name
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.'))
            {
                bail!("--models entries may only contain letters, digits, '_', '-' or '.', got '{name}'");
            }
        }
        if let Some(path) = &self.model_path {
            if !path.is_file() {
                bail!("--model-path '{}' does not exist", path.display());
            }
        }

        if self.detector_args.len() > MAX_HELPER_ARGS {
            bail!(
                "--detector-arg repeated too many times (max {MAX_HELPER_ARGS}, got {})",
                self.detector_args.len()
            );
        }
        if self.player_args.len() > MAX_HELPER_ARGS {
            bail!(
                "--player-arg repeated too many times (max {MAX_HELPER_ARGS}, got {})",
                self.player_args.len()
            );
        }
        for raw in &self.player_args {
            shell_words::split(raw)
                .with_context(|| format!("--player-arg '{raw}' is not valid shell quoting"))?;
        }

        self.player_cmd = sanitize_binary(&self.player_cmd, "--player-cmd", PLAYER_ALLOWLIST)?;
        self.detector_cmd =
            sanitize_binary(&self.detector_cmd, "--detector-cmd", DETECTOR_ALLOWLIST)?;
        if !self.detector_script.is_file() {
            bail!(
                "--detector-script '{}' does not exist",
                self.detector_script.display()
            );
        }

        Ok(())
    }

    /// Fail (or warn) when the media file is missing; only the listener needs it.
    pub fn check_media(&self) -> Result<()> {
        if self.media_path.is_file() {
            return Ok(());
        }
        if self.require_media {
            bail!(
                "media file '{}' not found (pass --require-media false to start anyway)",
                self.media_path.display()
            );
        }
        eprintln!(
            "Warning: media file '{}' not found; detections will fail to play",
            self.media_path.display()
        );
        Ok(())
    }

    pub fn thresholds(&self) -> Thresholds {
        self.label_overrides
            .iter()
            .fold(Thresholds::new(self.threshold), |acc, (label, value)| {
                acc.with_label(label.clone(), *value)
            })
    }

    /// A custom model file wins over named models.
    pub fn model_ref(&self) -> ModelRef {
        match &self.model_path {
            Some(path) => ModelRef::File(path.clone()),
            None => ModelRef::Named(
                model_names(&self.models)
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            ),
        }
    }

    pub fn detector_command(&self) -> DetectorCommand {
        DetectorCommand {
            program: self.detector_cmd.clone(),
            args: std::iter::once(self.detector_script.to_string_lossy().into_owned())
                .chain(self.detector_args.iter().cloned())
                .collect(),
            response_timeout: Duration::from_millis(self.detector_timeout_ms),
        }
    }

    /// Player built from --player-cmd/--player-arg; mpv keeps its fullscreen
    /// defaults unless arguments are given.
    pub fn player(&self) -> CommandPlayer {
        if self.player_args.is_empty() && self.player_cmd == "mpv" {
            return CommandPlayer::mpv();
        }
        let args = self
            .player_args
            .iter()
            .flat_map(|raw| shell_words::split(raw).unwrap_or_default())
            .collect();
        CommandPlayer::new(self.player_cmd.clone(), args)
    }

    /// Snapshot the CLI-controlled pipeline settings for downstream consumers.
    pub fn pipeline_config(&self) -> PipelineConfig {
        let check_interval = Duration::from_millis(self.check_interval_ms);
        PipelineConfig {
            frame_samples: self.frame_samples,
            queue_capacity: self.queue_capacity,
            window_ms: self.window_ms,
            min_fill_ms: self.min_fill_ms.unwrap_or(self.window_ms),
            check_interval,
            cooldown: self
                .cooldown_ms
                .map(Duration::from_millis)
                .unwrap_or(check_interval),
            idle_wake: Duration::from_millis(DEFAULT_IDLE_WAKE_MS),
            thresholds: self.thresholds(),
            media_path: self.media_path.clone(),
            max_detector_failures: self.max_detector_failures,
            debug_recording: self.debug_recording.then(|| RecorderConfig {
                dir: self.debug_dir.clone(),
                slots: self.debug_files,
                file_duration: Duration::from_secs(self.debug_file_secs),
            }),
            announce: !self.quiet,
        }
    }
}

fn model_names(raw: &str) -> Vec<&str> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .collect()
}

/// Parse `LABEL=VALUE` with VALUE in 0.0..=1.0.
pub(super) fn parse_label_threshold(raw: &str) -> Result<(String, f32)> {
    let (label, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("--label-threshold must look like LABEL=VALUE, got '{raw}'"))?;
    let label = label.trim();
    if label.is_empty() {
        bail!("--label-threshold label cannot be empty");
    }
    let value: f32 = value
        .trim()
        .parse()
        .with_context(|| format!("--label-threshold value for '{label}' is not a number"))?;
    if !(0.0..=1.0).contains(&value) {
        bail!("--label-threshold for '{label}' must be between 0.0 and 1.0, got {value}");
    }
    Ok((label.to_string(), value))
}

/// Allow either a known binary name or an absolute path.
pub(super) fn sanitize_binary(value: &str, flag: &str, allowlist: &[&str]) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("{flag} cannot be empty");
    }
    if let Some(allowed) = allowlist
        .iter()
        .find(|candidate| candidate.eq_ignore_ascii_case(trimmed))
    {
        return Ok((*allowed).to_string());
    }

    let path = Path::new(trimmed);
    if path.is_absolute() || trimmed.contains(std::path::MAIN_SEPARATOR) {
        let canonical = path
            .canonicalize()
            .with_context(|| format!("failed to canonicalize {flag} '{trimmed}'"))?;
        let metadata = fs::metadata(&canonical)
            .with_context(|| format!("failed to inspect {flag} '{}'", canonical.display()))?;
        if !metadata.is_file() {
            bail!("{flag} '{}' is not a file", canonical.display());
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = metadata.permissions().mode();
            if mode & 0o111 == 0 {
                bail!(
                    "{flag} '{}' exists but is not executable (mode {:o})",
                    canonical.display(),
                    mode
                );
            }
        }
        return canonical
            .to_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("{flag} must be valid UTF-8"));
    }

    bail!("{flag} must be one of {allowlist:?} or an existing binary path");
}
