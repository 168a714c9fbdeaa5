//! Audio sources: anything that can hand out fixed-size 16 kHz mono chunks.

use super::chunk::{samples_to_duration, AudioChunk};
use super::resample::resample_to_rate;
use super::{TARGET_CHANNELS, TARGET_RATE};
use crate::error::DeviceError;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

/// Blocking chunk reader driven by the capture worker.
pub trait AudioSource: Send {
    /// Samples per chunk this source produces.
    fn frame_samples(&self) -> usize;

    /// Block until the next chunk is available. Chunks carry increasing
    /// sequence numbers starting at 0.
    fn read_chunk(&mut self) -> Result<AudioChunk, DeviceError>;

    /// Human-readable description for startup logs.
    fn describe(&self) -> String;
}

pub(super) fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32_767.0).round() as i16
}

pub(super) fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / 32_768.0
}

/// Collects converted samples and cuts exact-length chunks from them, so a
/// resampler that emits 1279 or 1281 samples never leads to a padded chunk.
pub(super) struct Rechunker {
    frame_samples: usize,
    pending: Vec<i16>,
    next_seq: u64,
}

impl Rechunker {
    pub(super) fn new(frame_samples: usize) -> Self {
        Self {
            frame_samples: frame_samples.max(1),
            pending: Vec::with_capacity(frame_samples * 2),
            next_seq: 0,
        }
    }

    pub(super) fn extend(&mut self, samples: impl IntoIterator<Item = i16>) {
        self.pending.extend(samples);
    }

    pub(super) fn next_chunk(&mut self) -> Option<Result<AudioChunk, DeviceError>> {
        if self.pending.len() < self.frame_samples {
            return None;
        }
        let samples: Vec<i16> = self.pending.drain(..self.frame_samples).collect();
        let chunk = AudioChunk::new(self.next_seq, samples, self.frame_samples);
        self.next_seq += 1;
        Some(chunk.map_err(DeviceError::from))
    }

    pub(super) fn frame_samples(&self) -> usize {
        self.frame_samples
    }
}

/// Format of a WAV file as found on disk, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub float: bool,
    pub frames: u32,
}

impl WavFormat {
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(f64::from(self.frames) / f64::from(self.sample_rate))
    }

    /// Deviations from the 16 kHz / mono / 16-bit format the models expect.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.sample_rate != TARGET_RATE {
            warnings.push(format!(
                "sample rate is {} Hz (expected {TARGET_RATE} Hz); audio will be resampled",
                self.sample_rate
            ));
        }
        if self.channels != TARGET_CHANNELS {
            warnings.push(format!(
                "audio has {} channels (expected mono); using the first channel",
                self.channels
            ));
        }
        if self.bits_per_sample != 16 || self.float {
            warnings.push(format!(
                "sample format is {}-bit {} (expected 16-bit integer)",
                self.bits_per_sample,
                if self.float { "float" } else { "integer" }
            ));
        }
        warnings
    }
}

/// Replays a WAV file as if it were a microphone.
///
/// With pacing enabled each read waits until the chunk would have been
/// captured in real time, which exercises the scheduler the same way a device
/// does. The trailing partial chunk is discarded.
pub struct WavSource {
    path: PathBuf,
    format: WavFormat,
    samples: Vec<i16>,
    position: usize,
    next_seq: u64,
    frame_samples: usize,
    pace: bool,
    started: Option<Instant>,
}

impl WavSource {
    pub fn open(path: &Path, frame_samples: usize, pace: bool) -> Result<Self, DeviceError> {
        let (format, samples) = load_wav_mono(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            format,
            samples,
            position: 0,
            next_seq: 0,
            frame_samples: frame_samples.max(1),
            pace,
            started: None,
        })
    }

    pub fn format(&self) -> &WavFormat {
        &self.format
    }

    /// Normalized 16 kHz mono samples.
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn total_chunks(&self) -> usize {
        self.samples.len() / self.frame_samples
    }

    fn wait_for_real_time(&mut self) {
        let started = *self.started.get_or_insert_with(Instant::now);
        let due = started + samples_to_duration(self.position);
        let now = Instant::now();
        if due > now {
            thread::sleep(due - now);
        }
    }
}

impl AudioSource for WavSource {
    fn frame_samples(&self) -> usize {
        self.frame_samples
    }

    fn read_chunk(&mut self) -> Result<AudioChunk, DeviceError> {
        let end = self.position + self.frame_samples;
        if end > self.samples.len() {
            return Err(DeviceError::EndOfStream);
        }
        if self.pace {
            self.wait_for_real_time();
        }
        let chunk = AudioChunk::new(
            self.next_seq,
            self.samples[self.position..end].to_vec(),
            self.frame_samples,
        )?;
        self.position = end;
        self.next_seq += 1;
        Ok(chunk)
    }

    fn describe(&self) -> String {
        format!(
            "wav file '{}' ({:.2}s, {} Hz, {} ch)",
            self.path.display(),
            self.format.duration().as_secs_f64(),
            self.format.sample_rate,
            self.format.channels
        )
    }
}

/// Read a WAV file, keep its first channel, convert to i16 and resample to
/// the pipeline rate.
pub(crate) fn load_wav_mono(path: &Path) -> Result<(WavFormat, Vec<i16>), DeviceError> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|err| DeviceError::Unavailable(format!("{}: {err}", path.display())))?;
    let spec = reader.spec();
    let format = WavFormat {
        channels: spec.channels,
        sample_rate: spec.sample_rate,
        bits_per_sample: spec.bits_per_sample,
        float: spec.sample_format == hound::SampleFormat::Float,
        frames: reader.duration(),
    };
    let channels = usize::from(spec.channels.max(1));
    let read_err = |err: hound::Error| DeviceError::Stream(format!("{}: {err}", path.display()));

    let first_channel: Vec<i16> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .step_by(channels)
            .map(|s| s.map(f32_to_i16))
            .collect::<Result<_, _>>()
            .map_err(read_err)?,
        hound::SampleFormat::Int => {
            let bits = u32::from(spec.bits_per_sample);
            reader
                .samples::<i32>()
                .step_by(channels)
                .map(|s| s.map(|v| scale_int_sample(v, bits)))
                .collect::<Result<_, _>>()
                .map_err(read_err)?
        }
    };

    if spec.sample_rate == TARGET_RATE {
        return Ok((format, first_channel));
    }
    let as_f32: Vec<f32> = first_channel.iter().copied().map(i16_to_f32).collect();
    let resampled = resample_to_rate(&as_f32, spec.sample_rate, TARGET_RATE)
        .into_iter()
        .map(f32_to_i16)
        .collect();
    Ok((format, resampled))
}

fn scale_int_sample(value: i32, bits: u32) -> i16 {
    match bits {
        0..=16 => (value << (16 - bits)) as i16,
        _ => (value >> (bits - 16)) as i16,
    }
}
