//! Offline wake-phrase scan of a WAV file.
//!
//! The file is streamed through the detector one chunk at a time (streaming
//! mode, one reset at the start) and runs of consecutive above-threshold
//! chunks are reported as detection events.

use crate::audio::{samples_to_duration, AudioSource, WavFormat, WavSource};
use crate::detector::{Thresholds, WakeModel};
use crate::log_debug;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// A run of consecutive chunks where some label cleared its threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanEvent {
    pub start: Duration,
    pub end: Duration,
    /// Label with the highest score anywhere in the run.
    pub label: String,
    pub max_score: f32,
}

impl ScanEvent {
    pub fn duration(&self) -> Duration {
        self.end.saturating_sub(self.start)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LabelSummary {
    pub max_score: f32,
    pub chunks_above: usize,
}

/// Folds per-chunk verdicts into events.
#[derive(Debug, Default)]
pub struct EventGrouper {
    current: Option<ScanEvent>,
    events: Vec<ScanEvent>,
}

impl EventGrouper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk spanning `start..end`; `hit` is its best qualifying label.
    pub fn push(&mut self, start: Duration, end: Duration, hit: Option<(&str, f32)>) {
        match (hit, self.current.as_mut()) {
            (Some((label, score)), Some(event)) => {
                event.end = end;
                if score > event.max_score {
                    event.max_score = score;
                    event.label = label.to_string();
                }
            }
            (Some((label, score)), None) => {
                self.current = Some(ScanEvent {
                    start,
                    end,
                    label: label.to_string(),
                    max_score: score,
                });
            }
            (None, _) => {
                if let Some(event) = self.current.take() {
                    self.events.push(event);
                }
            }
        }
    }

    /// Close any event still open at end of input.
    pub fn finish(mut self) -> Vec<ScanEvent> {
        if let Some(event) = self.current.take() {
            self.events.push(event);
        }
        self.events
    }
}

#[derive(Debug, Clone)]
pub struct ScanReport {
    pub format: WavFormat,
    pub chunks: usize,
    pub threshold: f32,
    pub events: Vec<ScanEvent>,
    pub labels: BTreeMap<String, LabelSummary>,
}

/// `MM:SS.s`, e.g. `00:04.5`.
pub fn format_timestamp(offset: Duration) -> String {
    let tenths = (offset.as_millis() + 50) / 100;
    let minutes = tenths / 600;
    let rest = tenths % 600;
    format!("{minutes:02}:{:02}.{}", rest / 10, rest % 10)
}

pub fn scan_wav(
    path: &Path,
    model: &mut dyn WakeModel,
    thresholds: &Thresholds,
    frame_samples: usize,
) -> Result<ScanReport> {
    let mut source = WavSource::open(path, frame_samples, false)
        .with_context(|| format!("failed to open '{}'", path.display()))?;
    let format = source.format().clone();
    let chunk_duration = samples_to_duration(frame_samples);

    model.reset().context("failed to reset detector")?;
    let mut grouper = EventGrouper::new();
    let mut labels: BTreeMap<String, LabelSummary> = model
        .labels()
        .into_iter()
        .map(|label| (label, LabelSummary::default()))
        .collect();
    let mut chunks = 0usize;

    loop {
        let chunk = match source.read_chunk() {
            Ok(chunk) => chunk,
            Err(err) if err.is_end_of_stream() => break,
            Err(err) => return Err(err).context("failed to read audio"),
        };
        let result = model
            .score_chunk(&chunk)
            .with_context(|| format!("detector failed on chunk {}", chunk.seq()))?;
        for (label, &score) in &result.scores {
            let summary = labels.entry(label.clone()).or_default();
            summary.max_score = summary.max_score.max(score);
            if score > thresholds.for_label(label) {
                summary.chunks_above += 1;
            }
        }
        let start = chunk_duration * chunk.seq() as u32;
        grouper.push(start, start + chunk_duration, result.best_above(thresholds));
        chunks += 1;
    }

    let events = grouper.finish();
    log_debug(&format!(
        "scan of '{}': chunks={chunks} events={}",
        path.display(),
        events.len()
    ));
    Ok(ScanReport {
        format,
        chunks,
        threshold: thresholds.default_threshold(),
        events,
        labels,
    })
}

impl fmt::Display for ScanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let channel_label = match self.format.channels {
            1 => "mono",
            2 => "stereo",
            _ => "multi",
        };
        writeln!(f, "Audio file:")?;
        writeln!(f, "  Channels: {} ({channel_label})", self.format.channels)?;
        writeln!(f, "  Sample rate: {} Hz", self.format.sample_rate)?;
        writeln!(f, "  Sample width: {}-bit", self.format.bits_per_sample)?;
        writeln!(
            f,
            "  Duration: {:.2} seconds ({} frames)",
            self.format.duration().as_secs_f64(),
            self.format.frames
        )?;
        let warnings = self.format.warnings();
        if !warnings.is_empty() {
            writeln!(f, "Format warnings:")?;
            for warning in &warnings {
                writeln!(f, "  {warning}")?;
            }
            writeln!(f, "  Results may be inaccurate with this format.")?;
        }
        writeln!(f)?;
        for event in &self.events {
            writeln!(
                f,
                "{} - Detected '{}' (duration: {:.2}s, max conf: {:.3})",
                format_timestamp(event.start),
                event.label,
                event.duration().as_secs_f64(),
                event.max_score
            )?;
        }
        writeln!(f)?;
        writeln!(f, "Summary:")?;
        writeln!(f, "  Threshold: {}", self.threshold)?;
        writeln!(f, "  Total chunks processed: {}", self.chunks)?;
        writeln!(f, "  Events found: {}", self.events.len())?;
        for (label, summary) in &self.labels {
            writeln!(
                f,
                "  Max score for '{label}': {:.6} ({} chunks above threshold)",
                summary.max_score, summary.chunks_above
            )?;
        }
        Ok(())
    }
}
