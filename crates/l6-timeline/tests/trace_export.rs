use action_primitives::{
    ActionStep, CandidateSource, ErrorKind, ExecutionResult, HealingEvent, HealingTier, Locator,
    LocatorCandidate, StepOutput,
};
use chrono::Utc;
use l6_timeline::export::jsonl::{read_trace, write_trace};
use l6_timeline::{
    summarize, CodeGenerator, JsonlSink, ScriptFormat, SinkRecord, StepContext, TraceRecorder,
};
use selfheal_core_types::RunId;
use std::sync::Arc;

#[tokio::test]
async fn recorded_trace_survives_export_and_feeds_codegen() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(JsonlSink::create(dir.path().join("events.jsonl")).unwrap());
    let recorder = TraceRecorder::new(RunId::new()).with_sink(sink.clone());

    let open = ActionStep::navigate("open", "https://shop.test/item/42");
    let title = ActionStep::extract("title", "Product title");
    let context = StepContext::new(&title, "https://shop.test/item/42");

    recorder
        .record(
            &open,
            &StepContext::new(&open, "about:blank"),
            ExecutionResult::succeeded("open", 1, None, CandidateSource::Declared, 3),
            None,
        )
        .await;
    recorder
        .record(
            &title,
            &context,
            ExecutionResult::failed("title", 1, None, ErrorKind::LocatorNotFound, "no candidate", 1),
            None,
        )
        .await;

    let healed = LocatorCandidate::new(
        Locator::css("h1.product-name"),
        0.8,
        CandidateSource::HealedTier1,
    );
    let event = HealingEvent {
        step_id: "title".into(),
        fingerprint: context.fingerprint.clone(),
        tier: HealingTier::Tier1,
        attempt: 1,
        original_locator: None,
        healed_locator: Some(healed.clone()),
        success: true,
        duration_ms: 15,
        error_message: None,
        occurred_at: Utc::now(),
    };
    recorder
        .record(
            &title,
            &context,
            ExecutionResult::succeeded("title", 2, Some(healed), CandidateSource::HealedTier1, 4)
                .with_output(StepOutput::Text("Desk lamp".into())),
            Some(event),
        )
        .await;
    recorder.flush().await;

    let trace_path = dir.path().join("trace.jsonl");
    write_trace(&trace_path, &recorder.entries()).unwrap();
    let entries = read_trace(&trace_path).unwrap();
    assert_eq!(entries, recorder.entries());

    let histories = summarize(&entries);
    assert_eq!(histories.len(), 2);
    assert!(histories[1].healed());
    assert_eq!(histories[1].attempts.len(), 2);

    let yaml = CodeGenerator::new("item")
        .generate(&entries, ScriptFormat::Plan)
        .unwrap();
    assert!(yaml.contains("h1.product-name"));

    let events = std::fs::read_to_string(sink.path()).unwrap();
    let records: Vec<SinkRecord> = events
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records.len(), 4);
    assert_eq!(records[3].kind(), "healing_event");
}
