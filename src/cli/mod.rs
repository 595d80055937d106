pub mod codegen;
pub mod commands;
pub mod env;
pub mod inspect;
pub mod resolve;
pub mod run;
pub mod runtime;

pub use codegen::{cmd_codegen, CodegenArgs};
pub use commands::Commands;
pub use env::CliArgs;
pub use inspect::{cmd_inspect, InspectArgs};
pub use resolve::{cmd_resolve, ResolveArgs};
pub use run::{cmd_run, RunArgs};
pub use runtime::{init_logging, load_config, LoadedConfig};

use anyhow::Result;

use crate::config::AppConfig;

pub async fn dispatch(command: Commands, config: &AppConfig) -> Result<()> {
    match command {
        Commands::Run(args) => cmd_run(args, config).await,
        Commands::Resolve(args) => cmd_resolve(args, config),
        Commands::Codegen(args) => cmd_codegen(args),
        Commands::Inspect(args) => cmd_inspect(args),
    }
}
