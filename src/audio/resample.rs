//! Sample-rate conversion into the 16 kHz pipeline rate.
//!
//! With `high-quality-audio` the sinc resampler from rubato handles the
//! conversion; if it cannot be built for a rate we fall back to an FIR
//! low-pass followed by linear interpolation.

#[cfg(feature = "high-quality-audio")]
use crate::log_debug;
#[cfg(feature = "high-quality-audio")]
use anyhow::{anyhow, Result};
#[cfg(feature = "high-quality-audio")]
use rubato::{InterpolationParameters, InterpolationType, Resampler, SincFixedIn, WindowFunction};
use std::f32::consts::PI;
#[cfg(feature = "high-quality-audio")]
use std::sync::atomic::{AtomicBool, Ordering};

pub(super) const MIN_DEVICE_RATE: u32 = 2_000;
pub(super) const MAX_DEVICE_RATE: u32 = 1_600_000;
const MAX_DOWNSAMPLING_TAPS: usize = 129;
#[cfg(feature = "high-quality-audio")]
const SINC_CHUNK: usize = 256;

#[cfg(feature = "high-quality-audio")]
static SINC_FALLBACK_LOGGED: AtomicBool = AtomicBool::new(false);

/// Convert mono f32 audio from `from_rate` to `to_rate`. Rates outside the
/// supported device range are passed through untouched.
pub(crate) fn resample_to_rate(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if input.is_empty() || from_rate == to_rate || from_rate == 0 || to_rate == 0 {
        return input.to_vec();
    }
    if !(MIN_DEVICE_RATE..=MAX_DEVICE_RATE).contains(&from_rate) {
        return input.to_vec();
    }

    #[cfg(feature = "high-quality-audio")]
    {
        match resample_sinc(input, from_rate, to_rate) {
            Ok(output) => return output,
            Err(err) => {
                if !SINC_FALLBACK_LOGGED.swap(true, Ordering::AcqRel) {
                    log_debug(&format!(
                        "sinc resampler unavailable ({err}); using FIR/linear path"
                    ));
                }
            }
        }
    }

    resample_basic(input, from_rate, to_rate)
}

#[cfg(feature = "high-quality-audio")]
fn resample_sinc(input: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    let ratio = f64::from(to_rate) / f64::from(from_rate);
    let params = InterpolationParameters {
        sinc_len: 64,
        f_cutoff: 0.90,
        interpolation: InterpolationType::Cubic,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, SINC_CHUNK, 1)
        .map_err(|e| anyhow!("failed to construct sinc resampler: {e:?}"))?;

    let expected = ((input.len() as f64) * ratio).round().max(1.0) as usize;
    let mut out = Vec::with_capacity(expected + SINC_CHUNK);
    let mut segment = vec![0.0f32; SINC_CHUNK];
    for block in input.chunks(SINC_CHUNK) {
        let pad = block.last().copied().unwrap_or(0.0);
        segment.fill(pad);
        segment[..block.len()].copy_from_slice(block);
        let produced = resampler
            .process(std::slice::from_ref(&segment), None)
            .map_err(|e| anyhow!("resampler process failed: {e:?}"))?;
        if let Some(channel) = produced.first() {
            out.extend_from_slice(channel);
        }
    }
    // Padding the final block makes rubato overshoot; keep the nominal length.
    let last = out.last().copied().unwrap_or(0.0);
    out.resize(expected, last);
    Ok(out)
}

pub(super) fn resample_basic(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    let ratio = to_rate as f32 / from_rate as f32;
    let filtered = if from_rate > to_rate {
        let taps = downsampling_tap_count(from_rate, to_rate);
        low_pass_fir(input, from_rate, to_rate, taps)
    } else {
        input.to_vec()
    };
    resample_linear(&filtered, ratio)
}

pub(super) fn resample_linear(input: &[f32], ratio: f32) -> Vec<f32> {
    let output_len = (input.len() as f32 * ratio).round() as usize;
    let last = input.last().copied().unwrap_or(0.0);
    (0..output_len)
        .map(|i| {
            let src = i as f32 / ratio;
            let idx = src.floor() as usize;
            let frac = src - idx as f32;
            match (input.get(idx), input.get(idx + 1)) {
                (Some(a), Some(b)) => a * (1.0 - frac) + b * frac,
                _ => last,
            }
        })
        .collect()
}

/// Longer filters when collapsing 48 kHz into 16 kHz, short ones for
/// near-equal rates. Always odd so the filter stays centered.
pub(super) fn downsampling_tap_count(from_rate: u32, to_rate: u32) -> usize {
    let decimation = from_rate as f32 / to_rate as f32;
    let mut taps = (decimation * 4.0).ceil().max(11.0) as usize;
    if taps % 2 == 0 {
        taps += 1;
    }
    taps.min(MAX_DOWNSAMPLING_TAPS)
}

fn low_pass_fir(input: &[f32], from_rate: u32, to_rate: u32, taps: usize) -> Vec<f32> {
    if taps <= 1 {
        return input.to_vec();
    }
    let cutoff = (to_rate as f32 * 0.5 / from_rate as f32).min(0.499);
    let coeffs = design_low_pass(cutoff, taps);
    let half = taps / 2;
    (0..input.len())
        .map(|n| {
            coeffs
                .iter()
                .enumerate()
                .filter_map(|(k, coeff)| {
                    (n + k)
                        .checked_sub(half)
                        .and_then(|idx| input.get(idx))
                        .map(|sample| sample * coeff)
                })
                .sum::<f32>()
        })
        .collect()
}

/// Hamming-windowed sinc taps, normalized to unity DC gain.
pub(super) fn design_low_pass(normalized_cutoff: f32, taps: usize) -> Vec<f32> {
    let m = (taps.max(2) - 1) as f32;
    let mut coeffs: Vec<f32> = (0..taps)
        .map(|n| {
            let centered = n as f32 - m / 2.0;
            let sinc = if centered == 0.0 {
                2.0 * normalized_cutoff
            } else {
                let x = 2.0 * PI * normalized_cutoff * centered;
                (2.0 * normalized_cutoff * x.sin()) / x
            };
            let window = 0.54 - 0.46 * ((2.0 * PI * n as f32) / m).cos();
            sinc * window
        })
        .collect();
    let sum: f32 = coeffs.iter().sum();
    if sum != 0.0 {
        for coeff in &mut coeffs {
            *coeff /= sum;
        }
    }
    coeffs
}
