use clap::Subcommand;

use super::codegen::CodegenArgs;
use super::inspect::InspectArgs;
use super::resolve::ResolveArgs;
use super::run::RunArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Execute a plan with self-healing on the configured engine
    Run(RunArgs),

    /// Rank locator candidates for a target description on a snapshot
    Resolve(ResolveArgs),

    /// Generate a replayable plan or script from a recorded trace
    Codegen(CodegenArgs),

    /// Show per-step attempt and healing history of a trace
    Inspect(InspectArgs),
}
