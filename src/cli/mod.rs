pub mod commands;

use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::error::Result;

#[derive(Parser)]
#[command(name = "keg")]
#[command(version)]
#[command(about = "Install tool distributions from multiple backends")]
#[command(
    long_about = "Resolve a tool and version expression across every configured backend,\ndownload it once, and unpack it into a per-source install tree."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List every tool the enabled sources can serve
    List,

    /// List known versions of a tool, remote and installed
    Versions {
        /// Tool to list, e.g. java or maven
        tool: String,

        /// Only consult sources whose name matches this (prefix allowed)
        #[arg(short, long)]
        provider: Option<String>,
    },

    /// Download and unpack a tool version
    Install {
        /// Tool to install
        tool: String,

        /// Version expression: display version or source identifier
        version: String,

        /// Only consult sources whose name matches this (prefix allowed)
        #[arg(short, long)]
        provider: Option<String>,

        /// Also accept versions that merely start with the expression
        #[arg(long)]
        relaxed: bool,

        /// Resolve against local installs only, never touch the network
        #[arg(long)]
        offline: bool,
    },

    /// Remove an installed tool version and its archive
    Uninstall {
        /// Tool to remove
        tool: String,

        /// Version expression of the installed build
        version: String,

        /// Only consult sources whose name matches this (prefix allowed)
        #[arg(short, long)]
        provider: Option<String>,
    },

    /// Print the install path of an installed version
    Home {
        /// Tool to locate
        tool: String,

        /// Version expression of the installed build
        version: String,

        /// Only consult sources whose name matches this (prefix allowed)
        #[arg(short, long)]
        provider: Option<String>,

        /// Also accept versions that merely start with the expression
        #[arg(long)]
        relaxed: bool,
    },
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let config = AppConfig::load()?;
        match self.command {
            Commands::List => commands::list(&config).await,
            Commands::Versions { tool, provider } => {
                commands::versions(&config, &tool, provider.as_deref()).await
            }
            Commands::Install {
                tool,
                version,
                provider,
                relaxed,
                offline,
            } => {
                commands::install(
                    &config,
                    &tool,
                    &version,
                    provider.as_deref(),
                    relaxed,
                    offline,
                )
                .await
            }
            Commands::Uninstall {
                tool,
                version,
                provider,
            } => commands::uninstall(&config, &tool, &version, provider.as_deref()).await,
            Commands::Home {
                tool,
                version,
                provider,
                relaxed,
            } => commands::home(&config, &tool, &version, provider.as_deref(), relaxed).await,
        }
    }
}
