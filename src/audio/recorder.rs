//! System microphone capture via CPAL.
//!
//! The cpal stream lives on its own thread (streams are not `Send` on every
//! host). Its callback downmixes to mono and slices device-rate frames into a
//! small bounded channel; [`MicSource`] turns those frames into 16 kHz i16
//! chunks on the capture worker's thread.

use super::chunk::AudioChunk;
use super::dispatch::FrameDispatcher;
use super::resample::resample_to_rate;
use super::source::{f32_to_i16, AudioSource, Rechunker};
use super::TARGET_RATE;
use crate::error::DeviceError;
use crate::{lock_or_recover, log_debug};
use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// A read that sees no audio for this long means the device went away.
const STALL_TIMEOUT: Duration = Duration::from_secs(2);
/// Device frames buffered between the cpal callback and the reader.
const DEVICE_FRAME_CAPACITY: usize = 32;
const STREAM_STARTUP_TIMEOUT: Duration = Duration::from_secs(5);
/// Picked automatically when no device is configured and one is plugged in.
const AUTO_DEVICE_HINT: &str = "usb pnp";

/// Selected audio input device.
#[derive(Debug, Clone)]
pub struct Recorder {
    device_name: String,
}

impl Recorder {
    /// List microphone names so the CLI can expose a human-friendly selector.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host.input_devices().context("no input devices available")?;
        Ok(devices.filter_map(|device| device.name().ok()).collect())
    }

    /// Resolve the input device: exact name first, then a case-insensitive
    /// substring ("USB PnP" finds "USB PnP Audio Device"). Without a
    /// preference a "USB PnP" microphone wins over the system default.
    pub fn new(preferred_device: Option<&str>) -> Result<Self, DeviceError> {
        let device = resolve_device(preferred_device)?;
        let device_name = device
            .name()
            .map_err(|err| DeviceError::Unavailable(format!("device name unavailable: {err}")))?;
        Ok(Self { device_name })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Start streaming from the device and return a chunk reader.
    pub fn open_stream(&self, frame_samples: usize) -> Result<MicSource, DeviceError> {
        let (frame_tx, frame_rx) = bounded::<Vec<f32>>(DEVICE_FRAME_CAPACITY);
        let (ready_tx, ready_rx) = bounded::<Result<StreamInfo, DeviceError>>(1);
        let stop = Arc::new(AtomicBool::new(false));
        let stream_error = Arc::new(Mutex::new(None));
        let overruns = Arc::new(AtomicU64::new(0));

        let thread_ctx = StreamThread {
            device_name: self.device_name.clone(),
            frame_samples,
            frames: frame_tx,
            ready: ready_tx,
            stop: stop.clone(),
            stream_error: stream_error.clone(),
            overruns: overruns.clone(),
        };
        let handle = thread::Builder::new()
            .name("wakeplay-cpal".to_string())
            .spawn(move || thread_ctx.run())
            .map_err(|err| DeviceError::Unavailable(format!("failed to spawn stream thread: {err}")))?;

        let info = match ready_rx.recv_timeout(STREAM_STARTUP_TIMEOUT) {
            Ok(Ok(info)) => info,
            Ok(Err(err)) => return Err(err),
            Err(_) => {
                stop.store(true, Ordering::Relaxed);
                return Err(DeviceError::Unavailable(format!(
                    "'{}' did not start streaming",
                    self.device_name
                )));
            }
        };
        log_debug(&format!(
            "mic stream: device='{}' format={} rate={}Hz channels={}",
            self.device_name, info.format, info.sample_rate, info.channels
        ));

        Ok(MicSource {
            device_name: self.device_name.clone(),
            device_rate: info.sample_rate,
            frames: frame_rx,
            rechunker: Rechunker::new(frame_samples),
            stream_error,
            overruns,
            stop,
            stream_thread: Some(handle),
        })
    }
}

fn resolve_device(preferred: Option<&str>) -> Result<cpal::Device, DeviceError> {
    let host = cpal::default_host();
    let mut devices: Vec<cpal::Device> = match host.input_devices() {
        Ok(devices) => devices.collect(),
        Err(err) if preferred.is_some() => {
            return Err(DeviceError::Unavailable(format!(
                "no input devices available: {err}"
            )))
        }
        Err(err) => {
            log_debug(&format!("input device enumeration failed: {err}"));
            Vec::new()
        }
    };
    let names: Vec<String> = devices
        .iter()
        .map(|device| device.name().unwrap_or_default())
        .collect();
    match pick_device(&names, preferred)? {
        Some(index) => Ok(devices.swap_remove(index)),
        None => host
            .default_input_device()
            .ok_or_else(|| DeviceError::Unavailable("no default input device".to_string())),
    }
}

/// Index of the device to open; `None` means the host default.
pub(super) fn pick_device(
    names: &[String],
    preferred: Option<&str>,
) -> Result<Option<usize>, DeviceError> {
    let contains = |needle: &str| {
        let needle = needle.to_lowercase();
        names
            .iter()
            .position(|name| name.to_lowercase().contains(&needle))
    };
    match preferred {
        Some(wanted) => names
            .iter()
            .position(|name| name == wanted)
            .or_else(|| contains(wanted))
            .map(Some)
            .ok_or_else(|| DeviceError::Unavailable(format!("input device '{wanted}' not found"))),
        None => Ok(contains(AUTO_DEVICE_HINT)),
    }
}

struct StreamInfo {
    sample_rate: u32,
    channels: usize,
    format: String,
}

struct StreamThread {
    device_name: String,
    frame_samples: usize,
    frames: Sender<Vec<f32>>,
    ready: Sender<Result<StreamInfo, DeviceError>>,
    stop: Arc<AtomicBool>,
    stream_error: Arc<Mutex<Option<String>>>,
    overruns: Arc<AtomicU64>,
}

impl StreamThread {
    fn run(self) {
        let stream = match self.build() {
            Ok((stream, info)) => {
                let _ = self.ready.send(Ok(info));
                stream
            }
            Err(err) => {
                let _ = self.ready.send(Err(err));
                return;
            }
        };
        while !self.stop.load(Ordering::Relaxed) {
            thread::park_timeout(Duration::from_millis(100));
        }
        if let Err(err) = stream.pause() {
            log_debug(&format!("failed to pause audio stream: {err}"));
        }
    }

    fn build(&self) -> Result<(cpal::Stream, StreamInfo), DeviceError> {
        let device = resolve_device(Some(&self.device_name))?;
        let default_config = device
            .default_input_config()
            .map_err(|err| DeviceError::Unavailable(format!("no input config: {err}")))?;
        let format = default_config.sample_format();
        let config: StreamConfig = default_config.into();
        let sample_rate = config.sample_rate.0;
        let channels = usize::from(config.channels.max(1));
        let device_frame_samples =
            ((u64::from(sample_rate) * self.frame_samples as u64) / u64::from(TARGET_RATE)).max(1)
                as usize;
        let dispatcher = Arc::new(Mutex::new(FrameDispatcher::new(
            device_frame_samples,
            self.frames.clone(),
            self.overruns.clone(),
        )));

        let error_slot = self.stream_error.clone();
        let err_fn = move |err: cpal::StreamError| {
            log_debug(&format!("audio_stream_error: {err}"));
            lock_or_recover(&error_slot, "stream error latch").get_or_insert(err.to_string());
        };
        let build_err = |err: cpal::BuildStreamError| DeviceError::Unavailable(err.to_string());

        let stream = match format {
            SampleFormat::F32 => {
                let (dispatcher, overruns) = (dispatcher.clone(), self.overruns.clone());
                device
                    .build_input_stream(
                        &config,
                        move |data: &[f32], _| match dispatcher.try_lock() {
                            Ok(mut pump) => pump.push(data, channels, |s| s),
                            Err(_) => {
                                overruns.fetch_add(1, Ordering::Relaxed);
                            }
                        },
                        err_fn,
                        None,
                    )
                    .map_err(build_err)?
            }
            SampleFormat::I16 => {
                let (dispatcher, overruns) = (dispatcher.clone(), self.overruns.clone());
                device
                    .build_input_stream(
                        &config,
                        move |data: &[i16], _| match dispatcher.try_lock() {
                            Ok(mut pump) => pump.push(data, channels, |s| f32::from(s) / 32_768.0),
                            Err(_) => {
                                overruns.fetch_add(1, Ordering::Relaxed);
                            }
                        },
                        err_fn,
                        None,
                    )
                    .map_err(build_err)?
            }
            SampleFormat::U16 => {
                let (dispatcher, overruns) = (dispatcher.clone(), self.overruns.clone());
                device
                    .build_input_stream(
                        &config,
                        move |data: &[u16], _| match dispatcher.try_lock() {
                            Ok(mut pump) => pump.push(data, channels, |s| {
                                (f32::from(s) - 32_768.0) / 32_768.0
                            }),
                            Err(_) => {
                                overruns.fetch_add(1, Ordering::Relaxed);
                            }
                        },
                        err_fn,
                        None,
                    )
                    .map_err(build_err)?
            }
            other => {
                return Err(DeviceError::Unavailable(format!(
                    "unsupported sample format: {other:?}"
                )))
            }
        };
        stream
            .play()
            .map_err(|err| DeviceError::Unavailable(format!("failed to start stream: {err}")))?;
        Ok((
            stream,
            StreamInfo {
                sample_rate,
                channels,
                format: format!("{format:?}"),
            },
        ))
    }
}

/// Chunk reader over a live cpal stream.
pub struct MicSource {
    device_name: String,
    device_rate: u32,
    frames: Receiver<Vec<f32>>,
    rechunker: Rechunker,
    stream_error: Arc<Mutex<Option<String>>>,
    overruns: Arc<AtomicU64>,
    stop: Arc<AtomicBool>,
    stream_thread: Option<thread::JoinHandle<()>>,
}

impl MicSource {
    /// Device frames lost because the reader fell behind the callback.
    pub fn device_overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    fn ingest(&mut self, frame: Vec<f32>) {
        let converted = if self.device_rate == TARGET_RATE {
            frame
        } else {
            resample_to_rate(&frame, self.device_rate, TARGET_RATE)
        };
        self.rechunker.extend(converted.into_iter().map(f32_to_i16));
    }
}

impl AudioSource for MicSource {
    fn frame_samples(&self) -> usize {
        self.rechunker.frame_samples()
    }

    fn read_chunk(&mut self) -> Result<AudioChunk, DeviceError> {
        loop {
            if let Some(chunk) = self.rechunker.next_chunk() {
                return chunk;
            }
            if let Some(err) = lock_or_recover(&self.stream_error, "stream error latch").take() {
                return Err(DeviceError::Stream(err));
            }
            match self.frames.recv_timeout(STALL_TIMEOUT) {
                Ok(frame) => self.ingest(frame),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(DeviceError::Stalled {
                        ms: STALL_TIMEOUT.as_millis() as u64,
                    })
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(DeviceError::Disconnected(format!(
                        "'{}' stream closed",
                        self.device_name
                    )))
                }
            }
        }
    }

    fn describe(&self) -> String {
        format!("microphone '{}' ({} Hz native)", self.device_name, self.device_rate)
    }
}

impl Drop for MicSource {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.stream_thread.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}
