//! `wakeplay`: listen for a wake phrase and play a video when it is heard.

mod cli_utils;
mod signals;

use anyhow::{Context, Result};
use clap::Parser;
use std::panic;
use std::process::ExitCode;
use std::time::Duration;
use wakeplay::audio::{AudioSource, Recorder, WavSource};
use wakeplay::config::AppConfig;
use wakeplay::detector::{CommandDetector, WakeModel};
use wakeplay::mic_check::run_mic_check;
use wakeplay::scan::scan_wav;
use wakeplay::telemetry::init_tracing;
use wakeplay::{init_logging, log_debug, log_file_path, log_panic, Pipeline, ShutdownFlag};

use crate::cli_utils::{exit_code_for, list_input_devices, EXIT_CONFIG};
use crate::signals::{install_stop_handlers, spawn_signal_watcher};

fn main() -> ExitCode {
    let mut config = AppConfig::parse();
    if config.list_input_devices {
        return match list_input_devices() {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("Error: {err:#}");
                ExitCode::from(EXIT_CONFIG)
            }
        };
    }
    if let Err(err) = config.validate() {
        eprintln!("Error: {err:#}");
        return ExitCode::from(EXIT_CONFIG);
    }

    init_logging(&config);
    init_tracing(&config);
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        log_panic(info);
        default_hook(info);
    }));
    log_debug(&format!("log file: {}", log_file_path().display()));

    let outcome = if config.mic_check {
        mic_check_mode(&config)
    } else if let Some(path) = config.scan_wav.clone() {
        scan_mode(&config, &path)
    } else {
        listen_mode(&config)
    };

    match outcome {
        Ok(()) => {
            log_debug("=== wakeplay exited cleanly ===");
            ExitCode::SUCCESS
        }
        Err(err) => {
            let code = exit_code_for(&err);
            log_debug(&format!("wakeplay failed (exit {code}): {err:#}"));
            eprintln!("Error: {err:#}");
            ExitCode::from(code)
        }
    }
}

fn status(config: &AppConfig, line: &str) {
    if !config.quiet {
        println!("{line}");
    }
}

fn spawn_detector(config: &AppConfig) -> Result<CommandDetector> {
    let model_ref = config.model_ref();
    status(config, &format!("Loading wake word model(s): {model_ref}"));
    let detector = CommandDetector::spawn(&config.detector_command(), &model_ref)
        .context("failed to start the wake-phrase detector")?;
    status(
        config,
        &format!("Model labels: {}", detector.labels().join(", ")),
    );
    Ok(detector)
}

fn mic_check_mode(config: &AppConfig) -> Result<()> {
    let report = run_mic_check(
        config.input_device.as_deref(),
        Duration::from_secs(config.mic_check_secs),
        config.frame_samples,
        &config.mic_check_output,
    )?;
    print!("{report}");
    Ok(())
}

fn scan_mode(config: &AppConfig, path: &std::path::Path) -> Result<()> {
    let mut detector = spawn_detector(config)?;
    let report = scan_wav(path, &mut detector, &config.thresholds(), config.frame_samples)?;
    print!("{report}");
    Ok(())
}

fn listen_mode(config: &AppConfig) -> Result<()> {
    config.check_media()?;

    let shutdown = ShutdownFlag::new();
    install_stop_handlers()?;
    spawn_signal_watcher(shutdown.clone())?;

    let detector = spawn_detector(config)?;
    let source: Box<dyn AudioSource> = match &config.input_wav {
        Some(path) => {
            let source = WavSource::open(path, config.frame_samples, !config.no_pace)?;
            for warning in source.format().warnings() {
                eprintln!("Warning: {warning}");
            }
            status(config, &format!("Replaying {}", source.describe()));
            Box::new(source)
        }
        None => {
            let recorder = Recorder::new(config.input_device.as_deref())?;
            status(
                config,
                &format!("Using input device: {}", recorder.device_name()),
            );
            Box::new(recorder.open_stream(config.frame_samples)?)
        }
    };

    let pipeline_config = config.pipeline_config();
    if let Some(recorder) = &pipeline_config.debug_recording {
        status(
            config,
            &format!(
                "Debug recording enabled: {} files of {}s in {}",
                recorder.slots,
                recorder.file_duration.as_secs(),
                recorder.dir.display()
            ),
        );
    }
    status(config, "Listening for wake word... (Ctrl+C to stop)");

    let report = Pipeline::new(pipeline_config).run(
        source,
        Box::new(detector),
        Box::new(config.player()),
        &shutdown,
    )?;

    status(config, "");
    status(
        config,
        &format!(
            "Stopped. triggers={} checks={} chunks={} dropped={} overruns={}",
            report.trigger.triggers,
            report.scheduler.checks,
            report.scheduler.chunks_consumed,
            report.capture.chunks_dropped,
            report.scheduler.overruns
        ),
    );
    Ok(())
}
