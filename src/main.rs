use anyhow::Result;
use clap::Parser;
use selfheal_cli::cli::{dispatch, init_logging, load_config, CliArgs};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CliArgs::parse();

    init_logging(&cli.log_level, cli.debug, cli.log_json)?;

    info!("Starting selfheal v{}", env!("CARGO_PKG_VERSION"));

    let loaded = load_config(cli.config.as_ref())?;

    match dispatch(cli.command, &loaded.config).await {
        Ok(()) => {
            info!("Command completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            std::process::exit(1);
        }
    }
}
