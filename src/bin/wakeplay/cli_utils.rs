use anyhow::Result;
use wakeplay::audio;
use wakeplay::error::{DetectorError, DeviceError, PipelineError};

pub(crate) const EXIT_CONFIG: u8 = 1;

pub(crate) fn list_input_devices() -> Result<()> {
    // WAKEPLAY_TEST_DEVICES stands in for real hardware in tests.
    let devices = if let Ok(raw) = std::env::var("WAKEPLAY_TEST_DEVICES") {
        raw.split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()
    } else {
        audio::Recorder::list_devices().unwrap_or_else(|err| {
            eprintln!("Failed to list audio input devices: {err}");
            Vec::new()
        })
    };

    if devices.is_empty() {
        println!("No audio input devices detected.");
    } else {
        println!("Available audio input devices:");
        for name in devices {
            println!("  - {name}");
        }
    }
    Ok(())
}

/// Map a failure to the documented exit code: 2 device, 3 detector,
/// 4 worker panic, 1 for everything else (configuration).
pub(crate) fn exit_code_for(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(pipeline) = cause.downcast_ref::<PipelineError>() {
            return pipeline.exit_code() as u8;
        }
        if cause.downcast_ref::<DeviceError>().is_some() {
            return 2;
        }
        if cause.downcast_ref::<DetectorError>().is_some() {
            return 3;
        }
    }
    EXIT_CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn exit_codes_follow_error_kind() {
        let config = anyhow::anyhow!("--threshold must be between 0.0 and 1.0");
        assert_eq!(exit_code_for(&config), 1);

        let device: anyhow::Error = DeviceError::Unavailable("no mic".into()).into();
        assert_eq!(exit_code_for(&device), 2);

        let detector = Err::<(), _>(DetectorError::Exited)
            .context("failed to start detector")
            .unwrap_err();
        assert_eq!(exit_code_for(&detector), 3);

        let panicked: anyhow::Error = PipelineError::WorkerPanicked("capture").into();
        assert_eq!(exit_code_for(&panicked), 4);
    }
}
