//! Rolling WAV recorder fed from the capture tap.
//!
//! Keeps the last `slots` stretches of audio as `buffer_0.wav` …
//! `buffer_{N-1}.wav` for after-the-fact debugging of missed or false
//! detections. Nothing here can stall or fail the detection path: the
//! recorder reads its own queue on its own thread and only ever logs.

use crate::audio::{samples_to_duration, AudioChunk, ChunkConsumer, TARGET_RATE};
use crate::error::RecorderError;
use crate::log_debug;
use crate::pipeline::ShutdownFlag;
use crossbeam_channel::RecvTimeoutError;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

const RECV_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecorderConfig {
    pub dir: PathBuf,
    pub slots: usize,
    pub file_duration: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("debug_recordings"),
            slots: 10,
            file_duration: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecorderStats {
    pub files_written: u64,
    pub write_failures: u64,
    /// Samples left over at shutdown that never filled a file.
    pub discarded_samples: u64,
}

pub struct RollingRecorder {
    config: RecorderConfig,
    file_samples: usize,
    buffer: Vec<i16>,
    index: usize,
    stats: RecorderStats,
}

impl RollingRecorder {
    pub fn new(config: RecorderConfig) -> Result<Self, RecorderError> {
        fs::create_dir_all(&config.dir).map_err(|source| RecorderError::CreateDir {
            path: config.dir.clone(),
            source,
        })?;
        let file_samples =
            ((config.file_duration.as_millis() as u64 * u64::from(TARGET_RATE)) / 1000).max(1)
                as usize;
        Ok(Self {
            buffer: Vec::with_capacity(file_samples),
            file_samples,
            index: 0,
            stats: RecorderStats::default(),
            config: RecorderConfig {
                slots: config.slots.max(1),
                ..config
            },
        })
    }

    /// Path of slot `index`.
    pub fn slot_path(&self, index: usize) -> PathBuf {
        self.config.dir.join(format!("buffer_{index}.wav"))
    }

    /// Slot the next completed file goes to.
    pub fn next_index(&self) -> usize {
        self.index
    }

    pub fn stats(&self) -> RecorderStats {
        self.stats
    }

    pub fn push(&mut self, chunk: &AudioChunk) {
        self.buffer.extend_from_slice(chunk.samples());
        while self.buffer.len() >= self.file_samples {
            let carry = self.buffer.split_off(self.file_samples);
            let full = std::mem::replace(&mut self.buffer, carry);
            self.flush(&full);
        }
    }

    /// Drop whatever is buffered; a partial file is never written.
    pub fn finish(mut self) -> RecorderStats {
        self.stats.discarded_samples += self.buffer.len() as u64;
        self.buffer.clear();
        self.stats
    }

    fn flush(&mut self, samples: &[i16]) {
        let path = self.slot_path(self.index);
        match write_wav(&path, samples) {
            Ok(()) => {
                self.stats.files_written += 1;
                log_debug(&format!(
                    "debug recording saved: {} ({:.1}s)",
                    path.display(),
                    samples_to_duration(samples.len()).as_secs_f32()
                ));
                tracing::debug!(target: "wakeplay::recorder", path = %path.display(), "debug recording saved");
            }
            Err(err) => {
                self.stats.write_failures += 1;
                log_debug(&format!("debug recording failed: {err}"));
                tracing::warn!(target: "wakeplay::recorder", error = %err, "debug recording failed");
            }
        }
        // Advance even on failure so one bad slot does not pin the ring.
        self.index = (self.index + 1) % self.config.slots;
    }
}

/// Write 16 kHz mono 16-bit PCM.
pub(crate) fn write_wav(path: &Path, samples: &[i16]) -> Result<(), RecorderError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: TARGET_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let wrap = |source| RecorderError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(wrap)?;
    for &sample in samples {
        writer.write_sample(sample).map_err(wrap)?;
    }
    writer.finalize().map_err(wrap)
}

/// Handle to the recorder thread.
pub struct DebugRecorder {
    handle: thread::JoinHandle<RecorderStats>,
}

impl DebugRecorder {
    /// A panicked recorder only costs us its stats.
    pub fn join(self) -> Option<RecorderStats> {
        match self.handle.join() {
            Ok(stats) => Some(stats),
            Err(_) => {
                log_debug("debug recorder thread panicked");
                None
            }
        }
    }
}

pub fn spawn_debug_recorder(
    tap: ChunkConsumer,
    mut recorder: RollingRecorder,
    shutdown: ShutdownFlag,
) -> io::Result<DebugRecorder> {
    let handle = thread::Builder::new()
        .name("wakeplay-recorder".to_string())
        .spawn(move || {
            while !shutdown.is_requested() {
                match tap.recv_timeout(RECV_TIMEOUT) {
                    Ok(chunk) => recorder.push(&chunk),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            // Whatever capture queued before stopping still counts.
            while let Ok(chunk) = tap.try_recv() {
                recorder.push(&chunk);
            }
            let stats = recorder.finish();
            log_debug(&format!("debug recorder stopped: {stats:?}"));
            stats
        })?;
    Ok(DebugRecorder { handle })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::chunk_queue;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(label: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "wakeplay-recorder-{label}-{}-{nanos}",
            std::process::id()
        ))
    }

    fn chunks(count: usize, frame: usize) -> impl Iterator<Item = AudioChunk> {
        (0..count).map(move |seq| {
            AudioChunk::new(seq as u64, vec![(seq % 100) as i16; frame], frame).unwrap()
        })
    }

    #[test]
    fn twenty_seven_seconds_yields_five_files() {
        let dir = temp_dir("27s");
        let mut recorder = RollingRecorder::new(RecorderConfig {
            dir: dir.clone(),
            ..RecorderConfig::default()
        })
        .unwrap();
        // 100 ms chunks, 27 s total.
        for chunk in chunks(270, 1600) {
            recorder.push(&chunk);
        }
        assert_eq!(recorder.next_index(), 5);
        let stats = recorder.finish();
        assert_eq!(stats.files_written, 5);
        assert_eq!(stats.discarded_samples, 2 * 16_000);

        for index in 0..5 {
            let reader = hound::WavReader::open(dir.join(format!("buffer_{index}.wav"))).unwrap();
            assert_eq!(reader.spec().sample_rate, 16_000);
            assert_eq!(reader.spec().channels, 1);
            assert_eq!(reader.duration(), 80_000);
        }
        assert!(!dir.join("buffer_5.wav").exists());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn excess_samples_carry_into_next_file() {
        let dir = temp_dir("carry");
        let mut recorder = RollingRecorder::new(RecorderConfig {
            dir: dir.clone(),
            slots: 10,
            file_duration: Duration::from_secs(1),
        })
        .unwrap();
        // 1280-sample chunks do not divide 16000; 13 chunks = 16640.
        let all: Vec<AudioChunk> = chunks(25, 1280).collect();
        for chunk in &all[..13] {
            recorder.push(chunk);
        }
        assert_eq!(recorder.stats().files_written, 1);
        for chunk in &all[13..] {
            recorder.push(chunk);
        }
        // 32000 samples in, exactly two full seconds.
        assert_eq!(recorder.stats().files_written, 2);

        let second: Vec<i16> = hound::WavReader::open(dir.join("buffer_1.wav"))
            .unwrap()
            .samples::<i16>()
            .map(Result::unwrap)
            .collect();
        // The first 640 samples of file 1 are the tail of chunk 12.
        assert!(second[..640].iter().all(|&s| s == 12));
        assert_eq!(second[640], 13);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn index_wraps_and_overwrites_oldest_slot() {
        let dir = temp_dir("wrap");
        let mut recorder = RollingRecorder::new(RecorderConfig {
            dir: dir.clone(),
            slots: 3,
            file_duration: Duration::from_secs(1),
        })
        .unwrap();
        for chunk in chunks(40, 1600) {
            recorder.push(&chunk);
        }
        assert_eq!(recorder.stats().files_written, 4);
        assert_eq!(recorder.next_index(), 1);
        let first: Vec<i16> = hound::WavReader::open(dir.join("buffer_0.wav"))
            .unwrap()
            .samples::<i16>()
            .map(Result::unwrap)
            .collect();
        assert_eq!(first[0], 30);
        assert!(!dir.join("buffer_3.wav").exists());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn write_failure_is_counted_and_index_still_advances() {
        let dir = temp_dir("fail");
        let mut recorder = RollingRecorder::new(RecorderConfig {
            dir: dir.clone(),
            slots: 4,
            file_duration: Duration::from_secs(1),
        })
        .unwrap();
        // A directory squatting on the slot path makes the write fail.
        fs::create_dir_all(dir.join("buffer_0.wav")).unwrap();
        for chunk in chunks(20, 1600) {
            recorder.push(&chunk);
        }
        let stats = recorder.stats();
        assert_eq!(stats.write_failures, 1);
        assert_eq!(stats.files_written, 1);
        assert_eq!(recorder.next_index(), 2);
        assert!(dir.join("buffer_1.wav").is_file());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn recorder_thread_drains_tap_until_disconnect() {
        let dir = temp_dir("thread");
        let recorder = RollingRecorder::new(RecorderConfig {
            dir: dir.clone(),
            slots: 10,
            file_duration: Duration::from_secs(1),
        })
        .unwrap();
        let (producer, consumer) = chunk_queue(64);
        let handle = spawn_debug_recorder(consumer, recorder, ShutdownFlag::new()).unwrap();
        for chunk in chunks(25, 1600) {
            while producer.offer(chunk.clone()).is_err() {
                thread::sleep(Duration::from_millis(1));
            }
        }
        drop(producer);
        let stats = handle.join().unwrap();
        assert_eq!(stats.files_written, 2);
        assert_eq!(stats.discarded_samples, 5 * 1600);
        let _ = fs::remove_dir_all(&dir);
    }
}
