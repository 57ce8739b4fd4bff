use crate::config::Settings;
use anyhow::Result;
use clap::{Args, Subcommand};

#[derive(Debug, Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Debug, Subcommand)]
enum ConfigCommands {
    /// Show the effective settings
    Show,

    /// Get path to the settings file
    Path,
}

impl ConfigCommand {
    pub fn execute(self, settings: &Settings) -> Result<()> {
        match self.command {
            ConfigCommands::Show => {
                print!("{}", serde_yaml::to_string(settings)?);
                Ok(())
            }
            ConfigCommands::Path => {
                println!("{}", Settings::path()?.display());
                Ok(())
            }
        }
    }
}
