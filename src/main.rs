//! Wave Uploadr - validated multipart upload server

use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wave_uploadr::{config::Config, server::Server};

/// Accept, validate and store multipart file uploads
#[derive(Parser, Debug)]
#[command(name = "wave-uploadr")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log filter, a level or directives like `wave_uploadr=debug,aws=warn`.
    /// `RUST_LOG` takes precedence when set.
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// `RUST_LOG` if set and valid, else the CLI directive, else `info`
fn log_filter(cli_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(cli_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(&args.log_level))
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))?;

    info!(version = wave_uploadr::VERSION, "Starting Wave Uploadr");

    let config = Config::load(&args.config)?;
    info!(path = %args.config.display(), "Loaded configuration");

    let server = Server::new(config).await?;
    server.run().await?;

    Ok(())
}
