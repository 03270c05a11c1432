//! Config command - show or initialize configuration.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use docrecon_core::models::config::{OurCompany, ReconConfig};

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the default configuration as JSON
    Show,

    /// Write a starter configuration file
    Init {
        /// Where to write the file
        #[arg(default_value = "docrecon.json")]
        path: PathBuf,
    },
}

pub async fn run(args: ConfigArgs) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Show => {
            let config = ReconConfig::default();
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigCommand::Init { path } => {
            if path.exists() {
                anyhow::bail!("refusing to overwrite {}", path.display());
            }
            let config = ReconConfig {
                our_companies: vec![OurCompany {
                    name: "Example Company Sp. z o.o.".to_string(),
                    tax_id: "PL0000000000".to_string(),
                    address: String::new(),
                    country: "Poland".to_string(),
                    organization_id: String::new(),
                }],
                ..ReconConfig::default()
            };
            config.save(&path)?;
            println!("Wrote starter config to {}", path.display());
        }
    }

    Ok(())
}
