//! Config command - inspect and edit the settings the coordinator starts with.
//!
//! `show` prints every key next to its effective value and flags the ones
//! that differ from the built-in defaults. `set` and `reset` echo the value
//! as it was parsed, so `Unmarshalled` comes back as `unmarshalled`.

use std::time::Duration;

use clap::Subcommand;
use console::style;
use rangebridge::config::{config_file_path, ConfigFile, ConfigKey};

use super::common::format_size;
use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show every setting and whether it differs from the default
    Show,

    /// Print one setting
    Get {
        /// Setting name, e.g. transfer.transport
        key: String,
    },

    /// Change one setting
    Set {
        /// Setting name, e.g. transfer.transport
        key: String,

        /// New value
        value: String,
    },

    /// Restore one setting to its default
    Reset {
        /// Setting name, e.g. pool.max_outstanding
        key: String,
    },

    /// Print the configuration file path
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show => run_show(),
        ConfigCommands::Get { key } => {
            let key = parse_key(&key)?;
            println!("{}", display_value(key, &ConfigFile::load()?));
            Ok(())
        }
        ConfigCommands::Set { key, value } => {
            let key = parse_key(&key)?;
            edit(key, |config| change(config, key, &value))
        }
        ConfigCommands::Reset { key } => {
            let key = parse_key(&key)?;
            edit(key, |config| reset(config, key))
        }
        ConfigCommands::Path => {
            println!("{}", config_file_path().display());
            Ok(())
        }
    }
}

/// One row of `config show`.
#[derive(Debug, PartialEq)]
struct Setting {
    key: ConfigKey,
    value: String,
    changed: bool,
}

/// A setting before and after an edit, both as stored.
#[derive(Debug, PartialEq)]
struct Change {
    before: String,
    after: String,
}

fn parse_key(key: &str) -> Result<ConfigKey, CliError> {
    key.parse().map_err(|_| {
        let known: Vec<&str> = ConfigKey::all().iter().map(|key| key.name()).collect();
        CliError::Config(format!("unknown setting '{}' (known: {})", key, known.join(", ")))
    })
}

fn settings(config: &ConfigFile) -> Vec<Setting> {
    let defaults = ConfigFile::default();
    ConfigKey::all()
        .iter()
        .map(|&key| Setting {
            key,
            value: display_value(key, config),
            changed: key.get(config) != key.get(&defaults),
        })
        .collect()
}

fn display_value(key: ConfigKey, config: &ConfigFile) -> String {
    match key {
        ConfigKey::TransferChunkSize => format!(
            "{} ({})",
            config.transfer.chunk_size,
            format_size(config.transfer.chunk_size as u64)
        ),
        ConfigKey::LoggingFile if config.logging.file.is_none() => "(stderr only)".to_string(),
        _ => key.get(config),
    }
}

/// Longest a first read can wait for the producer to report ready.
fn readiness_budget(config: &ConfigFile) -> Duration {
    let bootstrap = config.transfer_config().bootstrap;
    bootstrap.poll_interval * bootstrap.poll_attempts.saturating_sub(1)
}

fn change(config: &mut ConfigFile, key: ConfigKey, value: &str) -> Result<Change, CliError> {
    let before = key.get(config);
    key.set(config, value)?;
    Ok(Change {
        before,
        after: key.get(config),
    })
}

fn reset(config: &mut ConfigFile, key: ConfigKey) -> Result<Change, CliError> {
    let default = key.get(&ConfigFile::default());
    change(config, key, &default)
}

fn edit(
    key: ConfigKey,
    apply: impl FnOnce(&mut ConfigFile) -> Result<Change, CliError>,
) -> Result<(), CliError> {
    let mut config = ConfigFile::load()?;
    let Change { before, after } = apply(&mut config)?;
    if before == after {
        println!("{} unchanged", key.name());
        return Ok(());
    }
    config.save()?;
    println!(
        "{}: {} -> {}",
        key.name(),
        style(before).dim(),
        style(display_value(key, &config)).green()
    );
    Ok(())
}

fn run_show() -> Result<(), CliError> {
    let path = config_file_path();
    let config = ConfigFile::load()?;

    let source = if path.exists() { "" } else { " (not created yet)" };
    println!("Config file: {}{}", path.display(), source);
    println!();

    let mut section = "";
    for setting in settings(&config) {
        if setting.key.section() != section {
            section = setting.key.section();
            println!("[{}]", style(section).bold());
        }
        let marker = if setting.changed {
            style("*").yellow().to_string()
        } else {
            " ".to_string()
        };
        println!("  {} {:<18} {}", marker, setting.key.key_name(), setting.value);
    }

    println!();
    println!(
        "Readiness wait: up to {} ms   (* differs from default)",
        readiness_budget(&config).as_millis()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rangebridge::TransportMode;

    fn changed_keys(config: &ConfigFile) -> Vec<&'static str> {
        settings(config)
            .into_iter()
            .filter(|setting| setting.changed)
            .map(|setting| setting.key.name())
            .collect()
    }

    #[test]
    fn test_defaults_show_no_changes() {
        let config = ConfigFile::default();
        assert!(changed_keys(&config).is_empty());
        assert_eq!(settings(&config).len(), ConfigKey::all().len());
    }

    #[test]
    fn test_changed_settings_are_flagged() {
        let config = ConfigFile::parse(
            "[transfer]\ntransport = unmarshalled\n[pool]\nmax_outstanding = 2\n",
        )
        .unwrap();
        assert_eq!(
            changed_keys(&config),
            vec!["transfer.transport", "pool.max_outstanding"]
        );
    }

    #[test]
    fn test_display_values() {
        let mut config = ConfigFile::default();
        config.transfer.chunk_size = 2048;
        assert_eq!(
            display_value(ConfigKey::TransferChunkSize, &config),
            "2048 (2.0 KB)"
        );
        assert_eq!(display_value(ConfigKey::LoggingFile, &config), "(stderr only)");
    }

    #[test]
    fn test_set_reports_normalized_value() {
        let mut config = ConfigFile::default();
        let change = change(&mut config, ConfigKey::TransferTransport, " Unmarshalled ").unwrap();

        assert_eq!(
            change,
            Change {
                before: "marshalled".to_string(),
                after: "unmarshalled".to_string(),
            }
        );
        assert_eq!(config.transfer.transport, TransportMode::Unmarshalled);
    }

    #[test]
    fn test_set_rejects_invalid_value() {
        let mut config = ConfigFile::default();
        let err = change(&mut config, ConfigKey::PoolMaxOutstanding, "0").unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_reset_restores_default() {
        let mut config = ConfigFile::default();
        config.logging.file = Some("/tmp/rangebridge.log".into());
        config.pool.max_outstanding = 3;

        reset(&mut config, ConfigKey::LoggingFile).unwrap();
        reset(&mut config, ConfigKey::PoolMaxOutstanding).unwrap();

        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_readiness_budget() {
        let mut config = ConfigFile::default();
        config.bootstrap.poll_attempts = 4;
        config.bootstrap.poll_interval_ms = 50;
        assert_eq!(readiness_budget(&config), Duration::from_millis(150));
    }

    #[test]
    fn test_unknown_key_lists_known_keys() {
        let err = parse_key("transfer.speed").unwrap_err();
        assert!(err.to_string().contains("transfer.transport"));
    }
}
