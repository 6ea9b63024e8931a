mod cli;
mod demo;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};

use conveyor_infra::ConveyorConfig;

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        conveyor_observability::init_with_level("debug");
    } else {
        conveyor_observability::init();
    }

    match cli.command {
        Command::Demo {
            jobs,
            fail_every,
            transfer_ms,
            poll_ms,
        } => {
            let config = ConveyorConfig::load()?;
            let options = demo::DemoOptions {
                jobs,
                fail_every,
                transfer_ms,
                poll_ms: poll_ms.unwrap_or(config.poll_interval_ms),
            };
            demo::run(config, options)?;
        }
        Command::Config { path } => {
            let config = ConveyorConfig::load_from(&path)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
