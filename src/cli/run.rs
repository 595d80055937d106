use action_flow::{
    validate_plan, FlowEvent, FlowRunner, HealingOrchestrator, RunReport, Session,
    StepOutputRecord,
};
use action_locator::{LocatorCache, SharedLocatorCache};
use action_primitives::{FlowPlan, StepOutput};
use anyhow::{bail, Context, Result};
use clap::Args;
use l6_timeline::export::jsonl::write_trace;
use l6_timeline::{summarize, JsonlSink, StepHistory, TraceRecorder};
use selfheal_core_types::RunId;
use selfheal_event_bus::{EventBus, InMemoryBus};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::engine::{build_driver, build_provider};

pub const TRACE_FILE: &str = "trace.jsonl";
pub const EVENTS_FILE: &str = "events.jsonl";

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Plan file (YAML)
    #[arg(long, value_name = "FILE")]
    pub plan: PathBuf,

    /// Shared locator cache file; overrides `cache.path`
    #[arg(long, value_name = "FILE")]
    pub cache: Option<PathBuf>,

    /// Directory for trace and event logs; overrides `trace.dir`
    #[arg(long, value_name = "DIR")]
    pub trace_dir: Option<PathBuf>,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn load_plan(path: &Path) -> Result<FlowPlan> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read plan {}", path.display()))?;
    let mut plan: FlowPlan = serde_yaml::from_str(&raw)
        .with_context(|| format!("Failed to parse plan {}", path.display()))?;
    if plan.name.trim().is_empty() {
        plan.name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| "plan".to_string());
    }
    Ok(plan)
}

pub async fn cmd_run(args: RunArgs, config: &AppConfig) -> Result<()> {
    let plan = load_plan(&args.plan)?;
    validate_plan(&plan)?;

    let trace_dir = args.trace_dir.clone().unwrap_or_else(|| config.trace.dir.clone());
    fs::create_dir_all(&trace_dir)
        .with_context(|| format!("Failed to create trace dir {}", trace_dir.display()))?;
    let cache_path = args.cache.clone().or_else(|| config.cache.path.clone());

    let run_id = RunId::new();
    let sink =
        JsonlSink::create(trace_dir.join(EVENTS_FILE)).context("Failed to open event log")?;
    let recorder = Arc::new(TraceRecorder::new(run_id.clone()).with_sink(Arc::new(sink)));
    let events = InMemoryBus::<FlowEvent>::new(256);
    let progress = spawn_progress(events.subscribe());

    let orchestrator = HealingOrchestrator::new(
        config.healing.clone(),
        build_provider(&config.provider)?,
        recorder.clone(),
    )?
    .with_events(events.clone());
    let runner = FlowRunner::new(Arc::new(orchestrator));

    let shared = match &cache_path {
        Some(path) => SharedLocatorCache::load(path)
            .with_context(|| format!("Failed to load locator cache {}", path.display()))?,
        None => SharedLocatorCache::new(),
    };

    let driver = build_driver(&config.engine)?;
    let cancel = CancellationToken::new();
    let interrupt = spawn_interrupt(cancel.clone());
    let mut session = Session::new(driver)
        .with_run_id(run_id)
        .with_cache(LocatorCache::new().with_shared(shared.clone()))
        .with_cancellation(cancel);

    let outcome = runner.run(&plan, &mut session).await;
    interrupt.abort();
    if let Err(err) = progress.await {
        warn!(?err, "progress listener stopped unexpectedly");
    }

    let entries = recorder.entries();
    let trace_path = write_trace(&trace_dir.join(TRACE_FILE), &entries)
        .context("Failed to write trace")?;
    info!(path = %trace_path, entries = entries.len(), "trace written");

    if let Some(path) = &cache_path {
        shared
            .save(path)
            .with_context(|| format!("Failed to save locator cache {}", path.display()))?;
    }

    let histories = summarize(&entries);
    match outcome {
        Ok(report) => {
            write_screenshots(&trace_dir, &report.outputs)?;
            print_report(&report, &histories, args.json)?;
            Ok(())
        }
        Err(aborted) => {
            write_screenshots(&trace_dir, &aborted.report.outputs)?;
            print_report(&aborted.report, &histories, args.json)?;
            bail!(aborted)
        }
    }
}

/// Log step completions until the run finishes
fn spawn_progress(mut rx: tokio::sync::broadcast::Receiver<FlowEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(FlowEvent::StepFinished {
                    step_id,
                    success,
                    attempts,
                    ..
                }) => {
                    info!(step_id = %step_id, success, attempts, "step finished");
                }
                Ok(FlowEvent::RunFinished { .. }) | Err(RecvError::Closed) => break,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "progress listener lagged");
                }
            }
        }
    })
}

fn spawn_interrupt(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            cancel.cancel();
        }
    })
}

fn write_screenshots(dir: &Path, outputs: &[StepOutputRecord]) -> Result<()> {
    for record in outputs {
        if let StepOutput::Screenshot(bytes) = &record.output {
            let path = dir.join(format!("{}.png", record.step_id));
            fs::write(&path, bytes)
                .with_context(|| format!("Failed to write screenshot {}", path.display()))?;
        }
    }
    Ok(())
}

fn print_report(report: &RunReport, histories: &[StepHistory], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let status = if report.is_complete() {
        "completed"
    } else {
        "aborted"
    };
    println!(
        "Run {} ({}) {}: {}/{} steps, {} healed, {}",
        report.run_id,
        report.plan_name,
        status,
        report.successful_steps,
        report.total_steps,
        report.healed_steps,
        humantime::format_duration(Duration::from_millis(report.duration_ms))
    );
    for history in histories {
        let marker = if history.succeeded { "ok" } else { "FAILED" };
        let via = history
            .final_source
            .map(|source| source.name())
            .unwrap_or("-");
        println!(
            "  [{marker}] {} via {via} ({} attempts)",
            history.step.id,
            history.attempts.len()
        );
    }
    for record in &report.outputs {
        if let StepOutput::Text(text) = &record.output {
            println!("  {} = {:?}", record.step_id, text);
        }
    }
    if let Some(failure) = &report.failure {
        println!("  error: {}", failure.error);
    }
    Ok(())
}
