//! Config command implementation.

use std::path::PathBuf;

use anyhow::{bail, Result};
use duet_core::config::{Config, OfferPolicy};

use super::{ConfigAction, ConfigArgs};
use crate::ui::{format_duration, parse_duration};

const KEYS: &[(&str, &str)] = &[
    ("general.output_dir", "Directory for received files"),
    ("transfer.chunk_size", "Payload bytes per chunk frame"),
    ("transfer.high_water_mark", "Buffered bytes before sending pauses"),
    ("transfer.backpressure_retry", "Delay between backpressure checks (e.g. 50ms)"),
    ("transfer.offer_policy", "Offer during a download: reject or replace"),
    ("pairing.base_url", "Base of printed pairing links"),
    ("pairing.port", "TCP port for duet listen"),
];

/// Run the config command.
pub async fn run(args: ConfigArgs) -> Result<()> {
    match args.action {
        ConfigAction::Get { key } => {
            let config = super::load_config();
            match get_config_value(&config, &key) {
                Some(v) => println!("{}: {}", key, v),
                None => bail!("Unknown configuration key: {key}"),
            }
        }

        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            set_config_value(&mut config, &key, &value)?;
            config.transfer.validate()?;
            config.save()?;
            println!("Set {} = {}", key, value);
        }

        ConfigAction::Show => {
            let config = super::load_config();
            println!();
            println!("Duet Configuration");
            println!("{}", "─".repeat(50));
            for (key, _) in KEYS {
                let value = get_config_value(&config, key).unwrap_or_default();
                println!("  {:<30} {}", key, value);
            }
            println!();
        }

        ConfigAction::List => {
            for (key, help) in KEYS {
                println!("  {:<30} {}", key, help);
            }
        }

        ConfigAction::Path => {
            println!("{}", Config::config_path().display());
        }

        ConfigAction::Reset => {
            Config::default().save()?;
            println!("Configuration reset to defaults.");
        }
    }

    Ok(())
}

fn get_config_value(config: &Config, key: &str) -> Option<String> {
    let value = match key {
        "general.output_dir" => config
            .general
            .output_dir
            .as_ref()
            .map_or_else(|| "(current directory)".to_string(), |p| p.display().to_string()),
        "transfer.chunk_size" => config.transfer.chunk_size.to_string(),
        "transfer.high_water_mark" => config.transfer.high_water_mark.to_string(),
        "transfer.backpressure_retry" => format_duration(config.transfer.backpressure_retry),
        "transfer.offer_policy" => match config.transfer.offer_policy {
            OfferPolicy::Reject => "reject".to_string(),
            OfferPolicy::Replace => "replace".to_string(),
        },
        "pairing.base_url" => config
            .pairing
            .base_url
            .clone()
            .unwrap_or_else(|| "(listening address)".to_string()),
        "pairing.port" => config.pairing.port.to_string(),
        _ => return None,
    };
    Some(value)
}

fn set_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    let unset = value.is_empty() || value == "none";

    match key {
        "general.output_dir" => {
            config.general.output_dir = (!unset).then(|| PathBuf::from(value));
        }
        "transfer.chunk_size" => config.transfer.chunk_size = value.parse()?,
        "transfer.high_water_mark" => config.transfer.high_water_mark = value.parse()?,
        "transfer.backpressure_retry" => {
            let Some(retry) = parse_duration(value) else {
                bail!("Invalid duration '{value}'. Use e.g. 50ms, 2s or 1m");
            };
            config.transfer.backpressure_retry = retry;
        }
        "transfer.offer_policy" => {
            config.transfer.offer_policy = match value {
                "reject" => OfferPolicy::Reject,
                "replace" => OfferPolicy::Replace,
                other => bail!("Invalid offer policy '{other}'. Use reject or replace"),
            };
        }
        "pairing.base_url" => {
            config.pairing.base_url = (!unset).then(|| value.to_string());
        }
        "pairing.port" => config.pairing.port = value.parse()?,
        _ => bail!("Unknown configuration key: {key}"),
    }

    Ok(())
}
