//! Main app runners for the record and permission commands

use std::path::Path;
use std::process::ExitCode;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::application::ports::{CaptureBackend, ConfigStore, KeepAlive};
use crate::application::{
    RecordingSession, SessionConfig, SessionError, SessionEvent, TICK_INTERVAL,
};
use crate::domain::audio::AudioMeta;
use crate::domain::config::AppConfig;
use crate::domain::recording::{Duration, PauseMode, SessionState};
use crate::infrastructure::{
    create_notifier, CpalCaptureBackend, FlacEncoderFactory, FsOutputStore, NoopKeepAlive,
    NotifierKeepAlive, XdgConfigStore,
};

use super::args::{RecordArgs, RecordOptions};
use super::control::{spawn_stdin_reader, ControlCommand};
use super::presenter::Presenter;
use super::signals::forward_shutdown_signals;

/// Exit codes
pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_ERROR: u8 = 1;
pub const EXIT_USAGE_ERROR: u8 = 2;

/// Deepest sample format the FLAC encoder accepts
const MAX_FLAC_BITS_PER_SAMPLE: u8 = 24;

/// Load and merge configuration from file and CLI
pub async fn load_merged_config<S: ConfigStore>(store: &S, cli_config: AppConfig) -> AppConfig {
    let file_config = match store.load().await {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, path = %store.path().display(), "ignoring unreadable config");
            AppConfig::empty()
        }
    };

    // Merge: defaults < file < cli
    AppConfig::defaults().merge(file_config).merge(cli_config)
}

/// Resolve record arguments against the config file.
///
/// Errors are usage errors: bad durations, modes or audio formats.
pub async fn resolve_record_options(args: RecordArgs) -> Result<RecordOptions, String> {
    let cli_config = AppConfig {
        channels: args.channels,
        bits_per_sample: args.bits_per_sample,
        pause_mode: args.pause_mode.map(|m| PauseMode::from(m).to_string()),
        notify: args.notify.then_some(true),
        max_duration: args.max_duration.clone(),
        ..AppConfig::empty()
    };
    let config = load_merged_config(&XdgConfigStore::new(), cli_config).await;
    build_record_options(args, &config)
}

fn build_record_options(args: RecordArgs, config: &AppConfig) -> Result<RecordOptions, String> {
    let sample_rates = config.sample_rates_or_default();
    let preferred_rate = args
        .sample_rate
        .or_else(|| sample_rates.first().copied())
        .ok_or_else(|| "No sample rate configured".to_string())?;

    let meta = AudioMeta::new(
        preferred_rate,
        config.channels_or_default(),
        config.bits_per_sample_or_default(),
    )
    .map_err(|e| format!("Invalid audio format: {}", e))?;
    if meta.bits_per_sample() > MAX_FLAC_BITS_PER_SAMPLE {
        return Err(format!(
            "Invalid audio format: FLAC supports at most {} bits per sample",
            MAX_FLAC_BITS_PER_SAMPLE
        ));
    }

    let pause_mode = match config.pause_mode.as_deref() {
        Some(mode) => mode
            .parse::<PauseMode>()
            .map_err(|e| format!("Invalid pause mode: {}", e))?,
        None => PauseMode::default(),
    };

    let max_duration = match config.max_duration.as_deref() {
        Some(s) => Some(
            s.parse::<Duration>()
                .map_err(|e| format!("Invalid max-duration: {}", e))?,
        ),
        None => None,
    };

    Ok(RecordOptions {
        path: args.path,
        meta,
        sample_rates,
        block_size: config.block_size_or_default(),
        pause_mode,
        max_duration,
        notify: config.notify_or_default(),
        notify_send: args.notify_send,
    })
}

/// Report whether an input device is reachable
pub fn run_permission() -> ExitCode {
    let presenter = Presenter::new();
    if CpalCaptureBackend::new().has_permission() {
        presenter.output("granted");
        ExitCode::from(EXIT_SUCCESS)
    } else {
        presenter.output("denied");
        ExitCode::from(EXIT_ERROR)
    }
}

/// Record until stopped
pub async fn run_record(options: RecordOptions) -> ExitCode {
    let mut presenter = Presenter::new();

    let keep_alive: Box<dyn KeepAlive> = if options.notify {
        Box::new(NotifierKeepAlive::new(create_notifier(options.notify_send)))
    } else {
        Box::new(NoopKeepAlive)
    };
    let config = SessionConfig {
        sample_rates: options.sample_rates.clone(),
        pause_mode: options.pause_mode,
        tick_interval: TICK_INTERVAL,
    };
    let (session, mut events) = RecordingSession::new(
        CpalCaptureBackend::new(),
        FlacEncoderFactory::new(options.block_size),
        FsOutputStore::new(),
        keep_alive,
        config,
    );

    if !session.check_permission() {
        presenter.error("No input device available");
        return ExitCode::from(EXIT_ERROR);
    }

    // Setup control sources
    let (tx, mut commands) = mpsc::channel(8);
    if let Err(e) = forward_shutdown_signals(tx.clone()) {
        presenter.error(&format!("Failed to setup signal handler: {}", e));
        return ExitCode::from(EXIT_ERROR);
    }
    if let Err(e) = spawn_stdin_reader(tx, |message| Presenter::new().warn(&message)) {
        presenter.error(&format!("Failed to read commands from stdin: {}", e));
        return ExitCode::from(EXIT_ERROR);
    }

    if let Err(e) = session.prepare(&options.path, options.meta).await {
        presenter.error(&format!("{} [{}]", e, e.code()));
        return ExitCode::from(EXIT_ERROR);
    }
    let path = match session.start().await {
        Ok(path) => path,
        Err(e) => {
            presenter.error(&format!("{} [{}]", e, e.code()));
            return ExitCode::from(EXIT_ERROR);
        }
    };
    if let Some(meta) = session.negotiated_meta().await {
        presenter.info(&format!("Capturing {}", meta));
    }
    presenter.show_recording(&path.display().to_string());

    let mut failure: Option<String> = None;
    let mut elapsed = 0.0;

    loop {
        tokio::select! {
            Some(event) = events.recv() => match event {
                SessionEvent::RecordingProgress { current_time } => {
                    elapsed = current_time;
                    presenter.update_recording(session.state(), elapsed, options.max_duration);
                    if reached_limit(elapsed, options.max_duration) {
                        info!("max duration reached");
                        break;
                    }
                }
                SessionEvent::RecordError { code, message } => {
                    failure = Some(format!("{} [{}]", message, code));
                    break;
                }
                other => debug!(event = ?other, "session event"),
            },
            command = commands.recv() => match command {
                Some(ControlCommand::Pause) => {
                    if let Err(e) = session.pause().await {
                        failure = Some(format!("{} [{}]", e, e.code()));
                        break;
                    }
                    presenter.update_recording(SessionState::Paused, elapsed, options.max_duration);
                }
                Some(ControlCommand::Resume) => {
                    if let Err(e) = session.resume().await {
                        failure = Some(format!("{} [{}]", e, e.code()));
                        break;
                    }
                    presenter.update_recording(SessionState::Recording, elapsed, options.max_duration);
                }
                Some(ControlCommand::Stop) | None => break,
            },
        }
    }

    let stopped = session.stop().await;
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::RecordError { code, message } = event {
            if failure.is_none() {
                failure = Some(format!("{} [{}]", message, code));
            }
        }
    }

    match (stopped, failure) {
        (Ok(path), None) => {
            presenter.spinner_success(&format!("Saved {}", describe(&path).await));
            presenter.output(&path.to_string_lossy());
            ExitCode::from(EXIT_SUCCESS)
        }
        (Ok(path), Some(message)) => {
            presenter.spinner_fail(&format!("Recording failed: {}", message));
            presenter.warn(&format!("Partial output kept at {}", path.display()));
            ExitCode::from(EXIT_ERROR)
        }
        // the session already tore itself down after the failure
        (Err(SessionError::InvalidState(_)), Some(message)) => {
            presenter.spinner_fail(&format!("Recording failed: {}", message));
            presenter.warn(&format!("Partial output kept at {}", options.path.display()));
            ExitCode::from(EXIT_ERROR)
        }
        (Err(e), _) => {
            presenter.spinner_fail(&format!("{} [{}]", e, e.code()));
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn reached_limit(elapsed_secs: f64, limit: Option<Duration>) -> bool {
    limit.is_some_and(|limit| elapsed_secs >= limit.as_secs() as f64)
}

/// Path plus file size, for the final status line
async fn describe(path: &Path) -> String {
    match tokio::fs::metadata(path).await {
        Ok(meta) => format!("{} ({} bytes)", path.display(), meta.len()),
        Err(_) => path.display().to_string(),
    }
}
