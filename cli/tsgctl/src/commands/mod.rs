//! CLI commands.

mod scale;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::{ConfigError, Connection, RawConnection};
use crate::logging::LogFormat;
use crate::output::OutputFormat;

/// Joyent Triton Service Groups CLI.
#[derive(Debug, Parser)]
#[command(name = "tsg")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Triton account name.
    #[arg(short = 'A', long, global = true, env = "TRITON_ACCOUNT")]
    account: Option<String>,

    /// CloudAPI endpoint URL.
    #[arg(short = 'U', long, global = true, env = "TRITON_URL")]
    url: Option<String>,

    /// MD5 or SHA256 fingerprint (or agent comment) of the account key.
    #[arg(short = 'K', long, global = true, env = "TRITON_KEY_ID")]
    key_id: Option<String>,

    /// Base64 private key text or key path. Uses ssh-agent when omitted.
    #[arg(
        long,
        global = true,
        env = "TRITON_KEY_MATERIAL",
        hide_env_values = true
    )]
    key_material: Option<String>,

    /// Output format.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Log format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Converge a service group onto an instance count.
    Scale(scale::ScaleCommand),

    /// Show CLI version.
    Version,
}

impl Cli {
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        let ctx = CommandContext {
            connection: RawConnection {
                url: self.url,
                account: self.account,
                key_id: self.key_id,
                key_material: self.key_material,
            },
            format: self.format,
        };

        match self.command {
            Commands::Scale(cmd) => cmd.run(ctx).await,
            Commands::Version => {
                println!("tsg {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub connection: RawConnection,
    pub format: OutputFormat,
}

impl CommandContext {
    /// Resolve connection settings, falling back to `SDC_*`.
    pub fn connection(&self) -> Result<Connection, ConfigError> {
        self.connection.clone().resolve()
    }
}
