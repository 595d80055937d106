mod common;

use action_flow::{FlowError, FlowRunner, HealingConfig, HealingOrchestrator, Session};
use action_primitives::{
    ActionStep, CandidateSource, FlowPlan, HealingTier, Locator, LocatorCandidate,
};
use common::{ScriptedDriver, ScriptedProvider};
use l6_timeline::{CodeGenerator, MemorySink, SinkRecord, TraceRecorder};
use selfheal_core_types::RunId;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn runner(provider: Arc<ScriptedProvider>) -> (FlowRunner, Arc<TraceRecorder>) {
    let recorder = Arc::new(TraceRecorder::new(RunId::new()));
    let orchestrator =
        HealingOrchestrator::new(HealingConfig::default(), provider, recorder.clone()).unwrap();
    (FlowRunner::new(Arc::new(orchestrator)), recorder)
}

fn login_plan() -> FlowPlan {
    FlowPlan::new(
        "login",
        vec![
            ActionStep::click("login", "Login button").with_locator(Locator::css("#login-btn")),
            ActionStep::extract("greeting", "Please sign in heading"),
        ],
    )
}

fn sign_in_candidate() -> LocatorCandidate {
    LocatorCandidate::new(
        Locator::role_name("button", "Sign In"),
        0.9,
        CandidateSource::HealedTier1,
    )
}

#[tokio::test]
async fn direct_action_rescues_step_and_run_continues() {
    let driver = ScriptedDriver::login()
        .hang_on("#login-btn")
        .hang_on(r#"role=button[name="Sign In"]"#);
    let provider = ScriptedProvider::new()
        .suggest(Some(sign_in_candidate()))
        .suggest(None)
        .act(true);
    let (runner, recorder) = runner(provider);
    let mut session = Session::new(driver);

    let report = runner.run(&login_plan(), &mut session).await.unwrap();

    assert!(report.is_complete());
    assert_eq!(report.successful_steps, 2);
    assert_eq!(report.healed_steps, 1);
    assert_eq!(report.text("greeting"), Some("Please sign in"));
    assert_eq!(recorder.attempts_for("login").len(), 4);
    assert_eq!(recorder.attempts_for("greeting").len(), 1);
    assert!(session.is_released());
}

#[tokio::test]
async fn exhausted_step_aborts_with_partial_report() {
    let driver = ScriptedDriver::login().hang_on("#login-btn");
    let (runner, _) = runner(ScriptedProvider::new());
    let mut session = Session::new(driver);
    let plan = FlowPlan::new(
        "login",
        vec![
            ActionStep::extract("greeting", "Please sign in heading"),
            ActionStep::click("login", "Login button").with_locator(Locator::css("#login-btn")),
        ],
    );

    let aborted = runner.run(&plan, &mut session).await.unwrap_err();

    assert!(matches!(aborted.source, FlowError::HealingExhausted { .. }));
    let report = aborted.report;
    assert_eq!(report.total_steps, 2);
    assert_eq!(report.successful_steps, report.total_steps - 1);
    let failure = report.failure.as_ref().unwrap();
    assert_eq!(failure.step_id, "login");
    assert_eq!(failure.attempts.len(), 5);
    let tiers: Vec<u8> = failure.attempts.iter().map(|entry| entry.tier()).collect();
    assert_eq!(tiers, vec![0, 1, 1, 2, 2]);
    assert!(session.is_released());
}

#[tokio::test]
async fn invalid_plan_is_rejected_before_any_step() {
    let driver = ScriptedDriver::login();
    let (runner, recorder) = runner(ScriptedProvider::new());
    let mut session = Session::new(driver.clone());
    let plan = FlowPlan::new(
        "dup",
        vec![
            ActionStep::extract("a", "Please sign in heading"),
            ActionStep::extract("a", "Email field"),
        ],
    );

    let aborted = runner.run(&plan, &mut session).await.unwrap_err();
    assert!(matches!(aborted.source, FlowError::InvalidPlan(_)));
    assert!(recorder.is_empty());
    assert!(driver.actions().is_empty());
}

#[tokio::test]
async fn cancelled_run_releases_session() {
    let token = CancellationToken::new();
    let (runner, recorder) = runner(ScriptedProvider::new());
    let mut session = Session::new(ScriptedDriver::login()).with_cancellation(token.clone());
    token.cancel();

    let aborted = runner.run(&login_plan(), &mut session).await.unwrap_err();

    assert!(matches!(aborted.source, FlowError::Cancelled));
    assert_eq!(aborted.report.successful_steps, 0);
    assert!(recorder.is_empty());
    assert!(session.is_released());
}

#[tokio::test]
async fn generated_plan_replays_without_healing() {
    let provider = ScriptedProvider::new().suggest(Some(sign_in_candidate()));
    let (runner_one, recorder) = runner(provider);
    let mut session = Session::new(ScriptedDriver::login().hang_on("#login-btn"));
    runner_one.run(&login_plan(), &mut session).await.unwrap();

    let replay: FlowPlan = CodeGenerator::new("login")
        .plan(&recorder.entries())
        .unwrap()
        .into();

    let replay_provider = ScriptedProvider::new();
    let (runner_two, replay_recorder) = runner(replay_provider.clone());
    let mut replay_session = Session::new(ScriptedDriver::login().hang_on("#login-btn"));
    let report = runner_two.run(&replay, &mut replay_session).await.unwrap();

    assert!(report.is_complete());
    assert_eq!(report.healed_steps, 0);
    assert_eq!(replay_recorder.len(), replay.steps.len());
    assert!(replay_provider.calls().is_empty());
}

#[tokio::test]
async fn sink_receives_logs_and_healing_events() {
    let sink = Arc::new(MemorySink::new());
    let recorder = Arc::new(TraceRecorder::new(RunId::new()).with_sink(sink.clone()));
    let provider = ScriptedProvider::new().suggest(Some(sign_in_candidate()));
    let orchestrator =
        HealingOrchestrator::new(HealingConfig::default(), provider, recorder).unwrap();
    let runner = FlowRunner::new(Arc::new(orchestrator));
    let mut session = Session::new(ScriptedDriver::login().hang_on("#login-btn"));

    runner.run(&login_plan(), &mut session).await.unwrap();

    let records = sink.records();
    let healing: Vec<&SinkRecord> = records
        .iter()
        .filter(|record| {
            matches!(record, SinkRecord::HealingEvent(event) if event.tier == HealingTier::Tier1)
        })
        .collect();
    assert_eq!(healing.len(), 1);
    assert_eq!(
        records
            .iter()
            .filter(|record| record.kind() == "action_log")
            .count(),
        3
    );
}
