const FLOOR_DB: f32 = -96.0;
const QUIET_AVERAGE_AMPLITUDE: f64 = 100.0;
const LOUD_AVERAGE_AMPLITUDE: f64 = 10_000.0;

/// RMS level of i16 PCM in dBFS, floored for silence and empty input.
pub fn rms_db(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return FLOOR_DB;
    }
    let energy: f64 = samples
        .iter()
        .map(|&s| {
            let v = f64::from(s) / 32_768.0;
            v * v
        })
        .sum::<f64>()
        / samples.len() as f64;
    let rms = energy.sqrt().max(1e-6);
    ((20.0 * rms.log10()) as f32).max(FLOOR_DB)
}

/// Amplitude summary used by the microphone check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelStats {
    pub average_amplitude: f64,
    pub peak_amplitude: u16,
    pub rms_db: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelVerdict {
    TooQuiet,
    TooLoud,
    Ok,
}

impl LevelStats {
    pub fn verdict(&self) -> LevelVerdict {
        if self.average_amplitude < QUIET_AVERAGE_AMPLITUDE {
            LevelVerdict::TooQuiet
        } else if self.average_amplitude > LOUD_AVERAGE_AMPLITUDE {
            LevelVerdict::TooLoud
        } else {
            LevelVerdict::Ok
        }
    }
}

pub fn level_stats(samples: &[i16]) -> LevelStats {
    if samples.is_empty() {
        return LevelStats {
            average_amplitude: 0.0,
            peak_amplitude: 0,
            rms_db: FLOOR_DB,
        };
    }
    let mut sum = 0u64;
    let mut peak = 0u16;
    for &s in samples {
        let magnitude = s.unsigned_abs();
        sum += u64::from(magnitude);
        peak = peak.max(magnitude);
    }
    LevelStats {
        average_amplitude: sum as f64 / samples.len() as f64,
        peak_amplitude: peak,
        rms_db: rms_db(samples),
    }
}
