//! CLI command definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Integrator - integration reconciliation controller
#[derive(Parser, Debug)]
#[command(name = "integrator")]
#[command(version)]
#[command(about = "Drives integrations toward their desired state")]
#[command(
    long_about = "Integrator watches integration records, provisions or tears down their deployments and retries until observed and desired state agree."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the controller until Ctrl+C
    Run {
        /// Configuration file (TOML, or JSON with a .json extension)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// JSON file with integrations to create at start-up
        #[arg(short, long)]
        seed: Option<PathBuf>,
    },

    /// Validate a configuration file and print the effective configuration
    CheckConfig {
        /// Configuration file to check
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from(["integrator", "run", "--seed", "seeds.json"]).unwrap();
        let Commands::Run { config, seed } = cli.command else {
            return;
        };
        assert_eq!(config, None);
        assert_eq!(seed, Some(PathBuf::from("seeds.json")));
    }

    #[test]
    fn test_check_config_requires_file() {
        assert!(Cli::try_parse_from(["integrator", "check-config"]).is_err());
    }
}
