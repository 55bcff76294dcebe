//! Configuration commands.

use clap::Args;
use gigwatch_core::Config;
use std::path::Path;

/// Config command arguments.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(clap::Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration as JSON5
    Show,

    /// Validate the configuration and environment overrides
    Validate,
}

/// Run the config command.
pub fn run(config_path: Option<&Path>, args: ConfigArgs) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Show => {
            let config = Config::resolve(config_path)?;
            println!("{}", config.to_json5()?);
        }
        ConfigCommand::Validate => match Config::resolve(config_path) {
            Ok(config) => {
                println!("Configuration is valid.");
                if config.model.api_key().is_none() {
                    println!("  Note: no API key set; chat replies will be canned.");
                }
            }
            Err(e) => anyhow::bail!("Configuration is invalid: {}", e),
        },
    }
    Ok(())
}
