//! Config commands

use std::path::Path;

use anyhow::{bail, Result};
use clap::Subcommand;

use vybe_visual::AuditConfig;

use crate::output::{print_success, OutputFormat};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write the default configuration
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the effective configuration, environment overrides included
    Show,
}

pub fn execute(cmd: ConfigCommands, config_path: &Path, format: OutputFormat) -> Result<()> {
    match cmd {
        ConfigCommands::Init { force } => {
            if config_path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", config_path.display());
            }
            AuditConfig::default().save(config_path)?;
            print_success(&format!("Wrote {}", config_path.display()));
        }

        ConfigCommands::Show => {
            let mut config = AuditConfig::load(config_path)?;
            config.apply_env()?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
                _ => print!("{}", toml::to_string_pretty(&config)?),
            }
        }
    }

    Ok(())
}
