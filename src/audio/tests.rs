use super::capture::run_capture_loop;
use super::chunk::ms_to_samples;
use super::dispatch::{append_downmixed_samples, FrameDispatcher};
use super::recorder::pick_device;
use super::resample::{
    design_low_pass, downsampling_tap_count, resample_basic, resample_linear, resample_to_rate,
    MAX_DEVICE_RATE, MIN_DEVICE_RATE,
};
use super::source::{f32_to_i16, Rechunker};
use super::{
    chunk_queue, AudioChunk, AudioSource, NotReady, RollingWindow, WavSource,
    DEFAULT_FRAME_SAMPLES, TARGET_RATE,
};
use crate::error::{ChunkError, DeviceError, PipelineError};
use crate::pipeline::ShutdownFlag;
use crossbeam_channel::bounded;
use std::collections::VecDeque;
use std::f32::consts::PI;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const FRAME: usize = DEFAULT_FRAME_SAMPLES;

fn chunk(seq: u64) -> AudioChunk {
    AudioChunk::new(seq, vec![seq as i16; FRAME], FRAME).unwrap()
}

fn temp_path(label: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!(
        "wakeplay-audio-{label}-{}-{nanos}.wav",
        std::process::id()
    ))
}

/// Hands out pre-built results in order, then reports end of stream.
struct ScriptedSource {
    reads: VecDeque<Result<AudioChunk, DeviceError>>,
}

impl ScriptedSource {
    fn chunks(count: u64) -> Self {
        Self {
            reads: (0..count).map(|seq| Ok(chunk(seq))).collect(),
        }
    }
}

impl AudioSource for ScriptedSource {
    fn frame_samples(&self) -> usize {
        FRAME
    }

    fn read_chunk(&mut self) -> Result<AudioChunk, DeviceError> {
        self.reads.pop_front().unwrap_or(Err(DeviceError::EndOfStream))
    }

    fn describe(&self) -> String {
        "scripted".into()
    }
}

#[test]
fn chunk_rejects_wrong_length() {
    let err = AudioChunk::new(0, vec![0; FRAME - 1], FRAME).unwrap_err();
    assert_eq!(
        err,
        ChunkError::Length {
            expected: FRAME,
            actual: FRAME - 1
        }
    );
    assert_eq!(chunk(0).duration(), Duration::from_millis(80));
}

#[test]
fn queue_drops_newest_when_full() {
    let (producer, consumer) = chunk_queue(3);
    for seq in 0..3 {
        producer.offer(chunk(seq)).unwrap();
    }
    assert_eq!(consumer.len(), 3);
    assert_eq!(producer.dropped().get(), 0);

    let overflow = producer.offer(chunk(3)).unwrap_err();
    assert_eq!(overflow.seq, 3);
    assert_eq!(overflow.total_dropped, 1);
    assert_eq!(consumer.dropped().get(), 1);

    let kept: Vec<u64> = std::iter::from_fn(|| consumer.try_recv().ok())
        .map(|c| c.seq())
        .collect();
    assert_eq!(kept, vec![0, 1, 2]);
}

#[test]
fn queue_overfill_by_k_drops_exactly_k() {
    let (producer, consumer) = chunk_queue(8);
    let failures = (0..13).filter(|&seq| producer.offer(chunk(seq)).is_err()).count();
    assert_eq!(failures, 5);
    assert_eq!(producer.dropped().get(), 5);
    assert_eq!(consumer.len(), 8);
}

#[test]
fn window_retains_62_chunks_after_63_appends() {
    let mut window = RollingWindow::new(ms_to_samples(5_000), ms_to_samples(5_000));
    for seq in 0..63 {
        window.append(chunk(seq));
        assert!(window.buffered_duration() <= Duration::from_secs(5));
    }
    assert_eq!(window.len(), 62);
    assert_eq!(window.buffered_samples(), 62 * FRAME);
    let seqs: Vec<u64> = window.seqs().collect();
    assert_eq!(seqs, (1..63).collect::<Vec<_>>());
}

#[test]
fn window_snapshot_is_contiguous_and_non_destructive() {
    let mut window = RollingWindow::new(FRAME * 4, FRAME * 4);
    for seq in 0..6 {
        window.append(chunk(seq));
    }
    let clip = window.snapshot().unwrap();
    assert_eq!((clip.first_seq, clip.last_seq), (2, 5));
    assert_eq!(clip.samples.len(), FRAME * 4);
    assert_eq!(clip.samples[0], 2);
    assert_eq!(clip.samples[FRAME * 4 - 1], 5);
    assert_eq!(clip.window_end, Duration::from_millis(6 * 80));
    assert_eq!(window.len(), 4);
    assert_eq!(window.snapshot().unwrap(), clip);
}

#[test]
fn window_signals_not_ready_during_warm_up() {
    let mut window = RollingWindow::new(FRAME * 10, FRAME * 5);
    assert!(window.snapshot().is_err());
    for seq in 0..4 {
        window.append(chunk(seq));
    }
    assert_eq!(
        window.snapshot().unwrap_err(),
        NotReady {
            buffered_samples: FRAME * 4,
            required_samples: FRAME * 5
        }
    );
    window.append(chunk(4));
    assert!(window.snapshot().is_ok());
    window.clear();
    assert!(window.is_empty());
    assert!(!window.is_ready());
}

#[test]
fn window_is_ready_when_full_as_whole_chunks_allow() {
    // 5 s is not a whole number of 80 ms chunks.
    let mut window = RollingWindow::new(ms_to_samples(5_000), ms_to_samples(5_000));
    for seq in 0..61 {
        window.append(chunk(seq));
    }
    assert!(!window.is_ready());
    window.append(chunk(61));
    assert!(window.is_ready());
}

#[test]
fn min_fill_is_clamped_to_window() {
    let mut window = RollingWindow::new(FRAME * 2, FRAME * 50);
    window.append(chunk(0));
    window.append(chunk(1));
    assert!(window.is_ready());
}

#[test]
fn capture_loop_forwards_in_order_and_stops_at_end_of_stream() {
    let (producer, consumer) = chunk_queue(16);
    let stats = run_capture_loop(
        Box::new(ScriptedSource::chunks(10)),
        &producer,
        None,
        &ShutdownFlag::new(),
    )
    .unwrap();
    assert_eq!(stats.chunks_read, 10);
    assert_eq!(stats.chunks_dropped, 0);
    let seqs: Vec<u64> = std::iter::from_fn(|| consumer.try_recv().ok())
        .map(|c| c.seq())
        .collect();
    assert_eq!(seqs, (0..10).collect::<Vec<_>>());
}

#[test]
fn capture_loop_never_blocks_on_a_full_queue() {
    let (producer, consumer) = chunk_queue(3);
    let stats = run_capture_loop(
        Box::new(ScriptedSource::chunks(20)),
        &producer,
        None,
        &ShutdownFlag::new(),
    )
    .unwrap();
    assert_eq!(stats.chunks_read, 20);
    assert_eq!(stats.chunks_dropped, 17);
    assert_eq!(consumer.len(), 3);
}

#[test]
fn capture_loop_feeds_tap_independently() {
    let (producer, consumer) = chunk_queue(2);
    let (tap, tap_consumer) = chunk_queue(8);
    let stats = run_capture_loop(
        Box::new(ScriptedSource::chunks(6)),
        &producer,
        Some(&tap),
        &ShutdownFlag::new(),
    )
    .unwrap();
    assert_eq!(stats.chunks_dropped, 4);
    assert_eq!(stats.tap_dropped, 0);
    assert_eq!(consumer.len(), 2);
    assert_eq!(tap_consumer.len(), 6);
}

#[test]
fn capture_loop_surfaces_device_errors() {
    let source = ScriptedSource {
        reads: VecDeque::from(vec![
            Ok(chunk(0)),
            Err(DeviceError::Disconnected("unplugged".into())),
            Ok(chunk(1)),
        ]),
    };
    let (producer, consumer) = chunk_queue(4);
    let shutdown = ShutdownFlag::new();
    let err = run_capture_loop(Box::new(source), &producer, None, &shutdown).unwrap_err();
    assert!(matches!(err, DeviceError::Disconnected(_)));
    assert_eq!(consumer.len(), 1);
    assert!(shutdown.is_requested());
}

#[test]
fn end_of_stream_leaves_shutdown_alone() {
    let (producer, _consumer) = chunk_queue(4);
    let shutdown = ShutdownFlag::new();
    run_capture_loop(Box::new(ScriptedSource::chunks(2)), &producer, None, &shutdown).unwrap();
    assert!(!shutdown.is_requested());
}

#[test]
fn capture_loop_honors_shutdown() {
    let shutdown = ShutdownFlag::new();
    shutdown.request();
    let (producer, consumer) = chunk_queue(4);
    let stats =
        run_capture_loop(Box::new(ScriptedSource::chunks(5)), &producer, None, &shutdown).unwrap();
    assert_eq!(stats.chunks_read, 0);
    assert!(consumer.is_empty());
}

#[test]
fn capture_worker_join_maps_device_failure() {
    let source = ScriptedSource {
        reads: VecDeque::from(vec![Err(DeviceError::Stalled { ms: 2000 })]),
    };
    let (producer, _consumer) = chunk_queue(4);
    let worker =
        super::spawn_capture_worker(Box::new(source), producer, None, ShutdownFlag::new())
            .unwrap();
    let err = worker.join().unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Device(DeviceError::Stalled { ms: 2000 })
    ));
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn rechunker_cuts_exact_frames_without_padding() {
    let mut rechunker = Rechunker::new(4);
    rechunker.extend([1, 2, 3]);
    assert!(rechunker.next_chunk().is_none());
    rechunker.extend([4, 5, 6, 7, 8, 9]);
    let first = rechunker.next_chunk().unwrap().unwrap();
    let second = rechunker.next_chunk().unwrap().unwrap();
    assert_eq!(first.samples(), [1, 2, 3, 4]);
    assert_eq!(second.samples(), [5, 6, 7, 8]);
    assert_eq!((first.seq(), second.seq()), (0, 1));
    assert!(rechunker.next_chunk().is_none());
}

#[test]
fn f32_conversion_clamps_out_of_range() {
    assert_eq!(f32_to_i16(2.0), i16::MAX);
    assert_eq!(f32_to_i16(-2.0), -i16::MAX);
    assert_eq!(f32_to_i16(0.0), 0);
}

#[test]
fn downmixes_multi_channel_audio() {
    let mut buf = Vec::new();
    append_downmixed_samples(&mut buf, &[1.0f32, -1.0, 0.5, 0.5], 2, |s| s);
    assert_eq!(buf, vec![0.0, 0.5]);
}

#[test]
fn downmix_handles_partial_trailing_frame() {
    let mut buf = Vec::new();
    append_downmixed_samples(&mut buf, &[0.2f32, 0.4, 0.6], 2, |s| s);
    assert_eq!(buf.len(), 2);
    assert!((buf[0] - 0.3).abs() < 1e-6);
    assert!((buf[1] - 0.6).abs() < 1e-6);
}

#[test]
fn dispatcher_counts_overruns_instead_of_blocking() {
    let (tx, rx) = bounded(1);
    let overruns = Arc::new(AtomicU64::new(0));
    let mut dispatcher = FrameDispatcher::new(4, tx, overruns.clone());
    dispatcher.push(&[0.1f32; 12], 1, |s| s);
    assert_eq!(rx.len(), 1);
    assert_eq!(overruns.load(Ordering::Relaxed), 2);
}

#[test]
fn dispatcher_converts_integer_formats() {
    let (tx, rx) = bounded(4);
    let mut dispatcher = FrameDispatcher::new(2, tx, Arc::new(AtomicU64::new(0)));
    dispatcher.push(&[16_384i16, -16_384], 2, |s| f32::from(s) / 32_768.0);
    assert!(rx.try_recv().is_err());
    dispatcher.push(&[16_384i16, 16_384], 2, |s| f32::from(s) / 32_768.0);
    assert_eq!(rx.try_recv().unwrap(), vec![0.0, 0.5]);
    assert_eq!(rx.try_recv().unwrap_err(), crossbeam_channel::TryRecvError::Empty);
}

#[test]
fn resample_passes_through_matching_or_invalid_rates() {
    let input = vec![0.1f32, 0.2, 0.3];
    assert_eq!(resample_to_rate(&input, TARGET_RATE, TARGET_RATE), input);
    assert_eq!(resample_to_rate(&input, 0, TARGET_RATE), input);
    assert_eq!(resample_to_rate(&input, MIN_DEVICE_RATE - 1, TARGET_RATE), input);
    assert_eq!(resample_to_rate(&input, MAX_DEVICE_RATE + 1, TARGET_RATE), input);
    assert!(resample_to_rate(&[], 48_000, TARGET_RATE).is_empty());
}

#[test]
fn resample_48k_to_16k_keeps_duration() {
    let input: Vec<f32> = (0..4_800)
        .map(|i| (2.0 * PI * 440.0 * i as f32 / 48_000.0).sin() * 0.5)
        .collect();
    let output = resample_to_rate(&input, 48_000, TARGET_RATE);
    assert_eq!(output.len(), 1_600);
}

#[test]
fn basic_resampler_filters_content_above_new_nyquist() {
    // 7 kHz survives 16 kHz output, 12 kHz must not fold back in.
    let rate = 48_000u32;
    let tone = |hz: f32| -> Vec<f32> {
        (0..rate as usize / 4)
            .map(|i| (2.0 * PI * hz * i as f32 / rate as f32).sin())
            .collect()
    };
    let energy = |samples: &[f32]| samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    let kept = energy(&resample_basic(&tone(1_000.0), rate, TARGET_RATE));
    let aliased = energy(&resample_basic(&tone(12_000.0), rate, TARGET_RATE));
    assert!(aliased < kept * 0.5, "aliased={aliased} kept={kept}");
}

#[test]
fn linear_resample_scales_length() {
    assert_eq!(resample_linear(&[0.0, 1.0, 2.0, 3.0], 2.0).len(), 8);
    assert_eq!(resample_linear(&[0.0, 1.0, 2.0, 3.0], 0.5).len(), 2);
}

#[test]
fn tap_count_is_odd_and_bounded() {
    for (from, to) in [(48_000, 16_000), (44_100, 16_000), (17_000, 16_000), (1_600_000, 16_000)] {
        let taps = downsampling_tap_count(from, to);
        assert_eq!(taps % 2, 1);
        assert!((11..=129).contains(&taps));
    }
}

#[test]
fn low_pass_has_unity_dc_gain() {
    let coeffs = design_low_pass(0.16, 31);
    let sum: f32 = coeffs.iter().sum();
    assert!((sum - 1.0).abs() < 1e-4);
}

fn write_test_wav(path: &PathBuf, spec: hound::WavSpec, frames: usize, value: impl Fn(usize) -> i32) {
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..frames {
        for _ in 0..spec.channels {
            writer.write_sample(value(i)).unwrap();
        }
    }
    writer.finalize().unwrap();
}

#[test]
fn wav_source_replays_whole_chunks_then_ends() {
    let path = temp_path("replay");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: TARGET_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    write_test_wav(&path, spec, FRAME * 3 + 100, |i| (i % 1000) as i32);

    let mut source = WavSource::open(&path, FRAME, false).unwrap();
    assert!(source.format().warnings().is_empty());
    assert_eq!(source.total_chunks(), 3);
    for seq in 0..3 {
        let chunk = source.read_chunk().unwrap();
        assert_eq!(chunk.seq(), seq);
        assert_eq!(chunk.len(), FRAME);
    }
    assert!(source.read_chunk().unwrap_err().is_end_of_stream());
    let _ = std::fs::remove_file(&path);
}

#[test]
fn wav_source_normalizes_stereo_24_bit_8k() {
    let path = temp_path("normalize");
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 8_000,
        bits_per_sample: 24,
        sample_format: hound::SampleFormat::Int,
    };
    write_test_wav(&path, spec, 8_000, |_| 1 << 20);

    let source = WavSource::open(&path, FRAME, false).unwrap();
    let warnings = source.format().warnings();
    assert_eq!(warnings.len(), 3);
    assert_eq!(source.format().duration(), Duration::from_secs(1));
    // One second at 8 kHz becomes one second at 16 kHz.
    assert_eq!(source.samples().len(), 16_000);
    // 2^20 in 24-bit is 2^12 in 16-bit.
    let middle = source.samples()[8_000];
    assert!((i32::from(middle) - 4_096).abs() <= 64, "middle={middle}");
    let _ = std::fs::remove_file(&path);
}

#[test]
fn wav_source_missing_file_is_unavailable() {
    let err = WavSource::open(&temp_path("missing"), FRAME, false).err();
    assert!(matches!(err, Some(DeviceError::Unavailable(_))));
}

fn device_names(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

#[test]
fn usb_pnp_microphone_is_picked_without_a_preference() {
    let names = device_names(&["Built-in Microphone", "USB PnP Sound Device"]);
    assert_eq!(pick_device(&names, None).unwrap(), Some(1));
    let names = device_names(&["Built-in Microphone", "HDMI"]);
    assert_eq!(pick_device(&names, None).unwrap(), None);
    assert_eq!(pick_device(&[], None).unwrap(), None);
}

#[test]
fn preferred_device_matches_exactly_then_by_substring() {
    let names = device_names(&["USB PnP Sound Device", "Blue Yeti", "Yeti"]);
    assert_eq!(pick_device(&names, Some("Yeti")).unwrap(), Some(2));
    assert_eq!(pick_device(&names, Some("blue")).unwrap(), Some(1));
    assert!(matches!(
        pick_device(&names, Some("Scarlett")),
        Err(DeviceError::Unavailable(_))
    ));
}
