use anyhow::Result;
use clap::Parser;
use tracing::error;

use proctor::cli::{self, Cli};
use proctor::config::ProctorConfig;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("proctor=info".parse()?),
        )
        .init();

    dotenvy::dotenv().ok();
    let config = ProctorConfig::from_env();

    let args = Cli::parse();
    if let Err(err) = cli::run(args, config) {
        error!("{err:#}");
        std::process::exit(1);
    }
    Ok(())
}
