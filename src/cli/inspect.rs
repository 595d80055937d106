use anyhow::{bail, Context, Result};
use clap::Args;
use l6_timeline::export::jsonl::read_trace;
use l6_timeline::{summarize, StepHistory};
use std::path::PathBuf;

#[derive(Args, Clone, Debug)]
pub struct InspectArgs {
    /// Trace file written by `run`
    #[arg(long, value_name = "FILE")]
    pub trace: PathBuf,

    /// Only show this step
    #[arg(long)]
    pub step: Option<String>,

    /// Print histories as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn cmd_inspect(args: InspectArgs) -> Result<()> {
    let entries = read_trace(&args.trace)
        .with_context(|| format!("Failed to read trace {}", args.trace.display()))?;
    let mut histories = summarize(&entries);
    if let Some(step) = &args.step {
        histories.retain(|history| &history.step.id == step);
        if histories.is_empty() {
            bail!("step '{step}' not found in {}", args.trace.display());
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&histories)?);
        return Ok(());
    }
    for history in &histories {
        print_history(history);
    }
    Ok(())
}

fn print_history(history: &StepHistory) {
    let status = match (history.succeeded, history.final_source) {
        (true, Some(source)) if source.is_healed() => format!("healed ({})", source.name()),
        (true, _) => "ok".to_string(),
        (false, _) => "failed".to_string(),
    };
    println!(
        "{} [{}] {} \"{}\"",
        history.step.id,
        status,
        history.step.kind.name(),
        history.step.target_description
    );
    println!("  page: {}", history.page_url);
    println!("  fingerprint: {}", history.fingerprint);
    for attempt in &history.attempts {
        let outcome = if attempt.success {
            "ok".to_string()
        } else {
            attempt
                .error_kind
                .map(|kind| kind.name().to_string())
                .unwrap_or_else(|| "failed".to_string())
        };
        println!(
            "  #{} tier{} {:<20} {:>6}ms  {}",
            attempt.attempt,
            attempt.tier,
            outcome,
            attempt.duration_ms,
            attempt.locator.as_deref().unwrap_or("-")
        );
    }
}
