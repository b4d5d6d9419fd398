use chroni_core::config::ClientConfig;

use crate::cli::ConfigCommands;
use crate::commands::common::{load_config, AppPaths};
use crate::error::CliError;

/// Values passed to `chroni config init`; `None` keeps the current value.
#[derive(Debug, Default)]
pub struct ConfigUpdate {
    pub api_base_url: Option<String>,
    pub probe_url: Option<String>,
    pub owner_id: Option<String>,
    pub ai_base_url: Option<String>,
    pub ai_model: Option<String>,
    pub resync_interval_secs: Option<u64>,
}

impl ConfigUpdate {
    /// Overlay explicit values on `existing` and validate the result.
    pub fn apply(self, existing: ClientConfig) -> Result<ClientConfig, CliError> {
        let merged = ClientConfig {
            api_base_url: self.api_base_url.or(existing.api_base_url),
            probe_url: self.probe_url.or(existing.probe_url),
            owner_id: self.owner_id.or(existing.owner_id),
            ai_base_url: self.ai_base_url.or(existing.ai_base_url),
            ai_model: self.ai_model.or(existing.ai_model),
            resync_interval_secs: self.resync_interval_secs.or(existing.resync_interval_secs),
            ..existing
        };
        Ok(merged.normalized()?)
    }
}

pub fn run_config(command: ConfigCommands, paths: &AppPaths) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show => run_config_show(paths),
        ConfigCommands::Init {
            api_base_url,
            probe_url,
            owner_id,
            ai_base_url,
            ai_model,
            resync_interval_secs,
        } => run_config_init(
            ConfigUpdate {
                api_base_url,
                probe_url,
                owner_id,
                ai_base_url,
                ai_model,
                resync_interval_secs,
            },
            paths,
        ),
    }
}

fn run_config_show(paths: &AppPaths) -> Result<(), CliError> {
    let config = load_config(paths)?;
    println!("config file:  {}", paths.config_path.display());
    println!("data dir:     {}", paths.data_dir.display());
    println!("{config:#?}");
    Ok(())
}

/// Write the merged config. The AI key is never written by this command;
/// supply it through `CHRONI_AI_API_KEY`.
pub fn run_config_init(update: ConfigUpdate, paths: &AppPaths) -> Result<(), CliError> {
    let existing = ClientConfig::load(&paths.config_path)?;
    let config = update.apply(existing)?;
    config.save(&paths.config_path)?;

    if config.has_remote() {
        println!("Sync target: {}", config.api_base_url.as_deref().unwrap_or_default());
    } else {
        println!("No journal backend configured; entries stay on this device");
    }
    println!("Saved {}", paths.config_path.display());
    Ok(())
}
