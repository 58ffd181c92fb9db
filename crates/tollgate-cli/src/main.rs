mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands::{inspect, jwks, verify};

#[derive(Debug, Parser)]
#[command(name = "tollgate", about = "Check bearer tokens against a tollgate configuration")]
struct Cli {
    #[arg(long, global = true)]
    json: bool,

    /// Log pipeline decisions (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the full authentication pipeline on a token
    Verify {
        /// TOML configuration file
        #[arg(long)]
        config: PathBuf,
        /// Scope the token must be valid for
        #[arg(long)]
        scope: String,
        /// Expected audience, as if sent in the audience header
        #[arg(long)]
        aud: Option<String>,
        /// Treat tokens with this jti as revoked (repeatable)
        #[arg(long = "revoked-jti")]
        revoked_jti: Vec<String>,
        token: String,
    },
    /// Print a token's header and claims without verifying it
    Inspect { token: String },
    /// Fetch a key set and list its keys
    Jwks { url: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Verify {
            config,
            scope,
            aud,
            revoked_jti,
            token,
        } => {
            verify::cmd_verify(
                verify::VerifyArgs {
                    config,
                    scope,
                    aud,
                    revoked_jti,
                    token,
                },
                cli.json,
            )
            .await?;
        }
        Commands::Inspect { token } => inspect::cmd_inspect(&token, cli.json)?,
        Commands::Jwks { url } => jwks::cmd_jwks(&url, cli.json).await?,
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub fn pout(json_mode: bool, value: serde_json::Value, text: &str) -> anyhow::Result<()> {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{text}");
    }
    Ok(())
}
