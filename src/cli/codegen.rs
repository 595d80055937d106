use anyhow::{Context, Result};
use clap::Args;
use l6_timeline::export::jsonl::read_trace;
use l6_timeline::{CodeGenerator, ScriptFormat};
use std::fs;
use std::path::PathBuf;
use tracing::info;

#[derive(Args, Clone, Debug)]
pub struct CodegenArgs {
    /// Trace file written by `run`
    #[arg(long, value_name = "FILE")]
    pub trace: PathBuf,

    /// Output format: plan or playwright
    #[arg(long, default_value = "plan")]
    pub format: ScriptFormat,

    /// Destination file; stdout when omitted
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,

    /// Name of the generated plan; defaults to the trace file stem
    #[arg(long)]
    pub name: Option<String>,
}

pub fn cmd_codegen(args: CodegenArgs) -> Result<()> {
    let entries = read_trace(&args.trace)
        .with_context(|| format!("Failed to read trace {}", args.trace.display()))?;
    let name = args.name.clone().unwrap_or_else(|| {
        args.trace
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| "replay".to_string())
    });
    let script = CodeGenerator::new(name)
        .generate(&entries, args.format)
        .context("Failed to generate script")?;

    match &args.out {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            fs::write(path, &script)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), format = ?args.format, "script written");
        }
        None => print!("{script}"),
    }
    Ok(())
}
