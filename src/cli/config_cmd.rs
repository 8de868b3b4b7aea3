//! Config command handler

use crate::application::ports::ConfigStore;
use crate::domain::audio::SUPPORTED_BITS_PER_SAMPLE;
use crate::domain::config::AppConfig;
use crate::domain::error::ConfigError;
use crate::domain::recording::{Duration, PauseMode};

use super::args::{is_valid_config_key, ConfigAction, VALID_CONFIG_KEYS};
use super::presenter::Presenter;

const NOT_SET: &str = "(not set)";

/// Handle config subcommand
pub async fn handle_config_command<S: ConfigStore>(
    action: ConfigAction,
    store: &S,
    presenter: &Presenter,
) -> Result<(), ConfigError> {
    match action {
        ConfigAction::Init => handle_init(store, presenter).await,
        ConfigAction::Set { key, value } => handle_set(store, presenter, &key, &value).await,
        ConfigAction::Get { key } => handle_get(store, presenter, &key).await,
        ConfigAction::List => handle_list(store, presenter).await,
        ConfigAction::Path => handle_path(store, presenter),
    }
}

async fn handle_init<S: ConfigStore>(store: &S, presenter: &Presenter) -> Result<(), ConfigError> {
    store.init().await?;
    presenter.success(&format!(
        "Config file created at: {}",
        store.path().display()
    ));
    Ok(())
}

async fn handle_set<S: ConfigStore>(
    store: &S,
    presenter: &Presenter,
    key: &str,
    value: &str,
) -> Result<(), ConfigError> {
    check_key(key)?;

    let mut config = store.load().await?;
    apply_value(&mut config, key, value)?;

    store.save(&config).await?;
    presenter.success(&format!("{} = {}", key, value));

    Ok(())
}

async fn handle_get<S: ConfigStore>(
    store: &S,
    presenter: &Presenter,
    key: &str,
) -> Result<(), ConfigError> {
    check_key(key)?;

    let config = store.load().await?;
    match read_value(&config, key) {
        Some(v) => presenter.output(&v),
        None => presenter.output(NOT_SET),
    }

    Ok(())
}

async fn handle_list<S: ConfigStore>(store: &S, presenter: &Presenter) -> Result<(), ConfigError> {
    let config = store.load().await?;

    for key in VALID_CONFIG_KEYS {
        let value = read_value(&config, key);
        presenter.key_value(key, value.as_deref().unwrap_or(NOT_SET));
    }

    Ok(())
}

fn handle_path<S: ConfigStore>(store: &S, presenter: &Presenter) -> Result<(), ConfigError> {
    presenter.output(&store.path().to_string_lossy());
    Ok(())
}

fn check_key(key: &str) -> Result<(), ConfigError> {
    if is_valid_config_key(key) {
        return Ok(());
    }
    Err(ConfigError::ValidationError {
        key: key.to_string(),
        message: format!("Unknown key. Valid keys: {}", VALID_CONFIG_KEYS.join(", ")),
    })
}

fn invalid(key: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        key: key.to_string(),
        message: message.into(),
    }
}

/// Validate `value` and store it under `key`
fn apply_value(config: &mut AppConfig, key: &str, value: &str) -> Result<(), ConfigError> {
    match key {
        "sample_rates" => config.sample_rates = Some(parse_rates(key, value)?),
        "channels" => {
            let channels = value
                .parse::<u8>()
                .ok()
                .filter(|c| *c >= 1)
                .ok_or_else(|| invalid(key, "Value must be a channel count of at least 1"))?;
            config.channels = Some(channels);
        }
        "bits_per_sample" => {
            let bits = value
                .parse::<u8>()
                .ok()
                // FLAC tops out at 24 bits
                .filter(|b| SUPPORTED_BITS_PER_SAMPLE.contains(b) && *b <= 24)
                .ok_or_else(|| invalid(key, "Value must be one of 8, 16, 24"))?;
            config.bits_per_sample = Some(bits);
        }
        "block_size" => {
            let size = value
                .parse::<usize>()
                .ok()
                .filter(|s| *s > 0)
                .ok_or_else(|| invalid(key, "Value must be a positive frame count"))?;
            config.block_size = Some(size);
        }
        "pause_mode" => {
            let mode = value
                .parse::<PauseMode>()
                .map_err(|e| invalid(key, e.to_string()))?;
            config.pause_mode = Some(mode.to_string());
        }
        "notify" => {
            let notify =
                parse_bool(value).map_err(|_| invalid(key, "Value must be 'true' or 'false'"))?;
            config.notify = Some(notify);
        }
        "max_duration" => {
            let duration = value
                .parse::<Duration>()
                .map_err(|e| invalid(key, e.to_string()))?;
            config.max_duration = Some(duration.to_string());
        }
        _ => return Err(invalid(key, "Unknown key")),
    }
    Ok(())
}

fn read_value(config: &AppConfig, key: &str) -> Option<String> {
    match key {
        "sample_rates" => config.sample_rates.as_ref().map(|rates| {
            rates
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(",")
        }),
        "channels" => config.channels.map(|c| c.to_string()),
        "bits_per_sample" => config.bits_per_sample.map(|b| b.to_string()),
        "block_size" => config.block_size.map(|s| s.to_string()),
        "pause_mode" => config.pause_mode.clone(),
        "notify" => config.notify.map(|b| b.to_string()),
        "max_duration" => config.max_duration.clone(),
        _ => None,
    }
}

/// Parse a comma-separated list of sample rates
fn parse_rates(key: &str, value: &str) -> Result<Vec<u32>, ConfigError> {
    let rates = value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u32>().ok().filter(|r| *r > 0))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| invalid(key, "Value must be a comma-separated list of rates in Hz"))?;
    if rates.is_empty() {
        return Err(invalid(key, "At least one sample rate is required"));
    }
    Ok(rates)
}

/// Parse a boolean value
fn parse_bool(value: &str) -> Result<bool, ()> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(()),
    }
}
