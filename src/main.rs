#[macro_use]
extern crate tracing;

use std::env;

use clap::Parser;
use launchpad::cli::{self, Cli, Sub};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let directives = env::var("RUST_LOG").unwrap_or_else(|_| "launchpad=debug".to_owned());
    let env_filter = EnvFilter::builder().parse_lossy(directives);
    tracing_subscriber::fmt()
        .compact()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter)
        .init();

    match cli.subcommand {
        Sub::Validate { config } => {
            cli::validate(config.as_deref())?;
        }
        Sub::Demo { config, json } => {
            let config = cli::load_config(config.as_deref())?;
            info!("running demo");
            cli::run_demo(&config, json)?;
        }
    }

    Ok(())
}
