use std::path::PathBuf;

use almanac_core::config::AlmanacConfig;

use crate::cli::ConfigCommands;
use crate::commands::common::print_json;
use crate::context::CliContext;
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, context: &CliContext) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show => print_json(&context.config),
        ConfigCommands::Path => {
            println!("{}", context.config_path.display());
            Ok(())
        }
        ConfigCommands::Set {
            supabase_url,
            supabase_anon_key,
            data_dir,
            debounce_ms,
            interval_secs,
        } => {
            // Start from the file alone so environment overrides are not persisted
            let mut config = AlmanacConfig::load_from_path(&context.config_path)?;
            apply_config_update(
                &mut config,
                ConfigUpdate {
                    supabase_url,
                    supabase_anon_key,
                    data_dir,
                    debounce_ms,
                    interval_secs,
                },
            )?;
            config.save_to_path(&context.config_path)?;
            println!("Saved {}", context.config_path.display());
            Ok(())
        }
    }
}

#[derive(Debug, Default)]
pub struct ConfigUpdate {
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub debounce_ms: Option<u64>,
    pub interval_secs: Option<u64>,
}

pub fn apply_config_update(
    config: &mut AlmanacConfig,
    update: ConfigUpdate,
) -> Result<(), CliError> {
    if let Some(url) = update.supabase_url {
        config.supabase_url = Some(url);
    }
    if let Some(key) = update.supabase_anon_key {
        config.supabase_anon_key = Some(key);
    }
    if let Some(dir) = update.data_dir {
        config.data_dir = Some(dir);
    }
    if let Some(debounce_ms) = update.debounce_ms {
        config.sync.debounce_ms = debounce_ms;
    }
    if let Some(interval_secs) = update.interval_secs {
        if interval_secs == 0 {
            return Err(CliError::InvalidInput(
                "interval-secs must be greater than zero".to_string(),
            ));
        }
        config.sync.interval_secs = interval_secs;
    }
    // A half-configured project is allowed between two `set` calls
    if config.supabase_url.is_some() && config.supabase_anon_key.is_some() {
        config.supabase()?;
    }
    Ok(())
}
