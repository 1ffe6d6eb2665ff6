use clap::{Parser, Subcommand};

use crate::constants::{DEFAULT_CONFIG_FILE, PROBE_TIMEOUT_SECONDS};

#[derive(Parser, Debug)]
#[command(version)]
#[command(
    about = "Launches game clients on several accounts one after another and probes game servers"
)]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: String,

    /// Enable verbose logging
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Launch every configured task in order
    Sequence {
        /// Skip the remaining tasks after the first failed launch
        #[arg(short, long, default_value_t = false)]
        abort_on_failure: bool,
    },

    /// Launch a single client
    Launch {
        /// Account username from the config file
        #[arg(short, long)]
        account: String,

        /// Server id from the config file
        #[arg(short, long)]
        server: String,
    },

    /// Check whether game servers answer the login handshake
    Probe {
        /// Only probe this server id
        #[arg(short, long)]
        server: Option<String>,

        /// Keep probing, printing results every N seconds
        #[arg(short, long)]
        watch: Option<u64>,

        /// Seconds to wait for a server reply
        #[arg(short, long, default_value_t = PROBE_TIMEOUT_SECONDS)]
        timeout: u64,
    },
}

impl Args {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.config.trim().is_empty() {
            anyhow::bail!("Config path cannot be empty");
        }

        match &self.command {
            Command::Launch { account, server } => {
                if account.trim().is_empty() || server.trim().is_empty() {
                    anyhow::bail!("Account and server cannot be empty");
                }
            }
            Command::Probe {
                watch: Some(0), ..
            } => anyhow::bail!("Watch interval must be greater than 0"),
            Command::Probe { timeout: 0, .. } => {
                anyhow::bail!("Probe timeout must be greater than 0")
            }
            _ => {}
        }

        Ok(())
    }
}
