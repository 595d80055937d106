//! Tiered healing state machine
//!
//! One step runs as:
//!
//! ```text
//! Init -> Executing -> Success
//!                   -> LocatorFailed -> Tier1Healing -> ReExecuting -> Tier1Success -> Success
//!                                                    -> Tier1Exhausted -> Tier2Healing
//!                                       Tier2Healing -> Tier2ActionExecuted -> Success
//!                                                    -> Tier2Exhausted -> TerminalFailure
//! ```
//!
//! Every attempt, including Tier-1 attempts where the provider had nothing to
//! offer, produces exactly one trace entry. Each Tier-1 attempt re-runs the
//! resolver on a fresh snapshot before the provider is consulted.

use action_locator::LocatorResolver;
use action_primitives::{
    ActionKind, ActionStep, CandidateSource, ErrorKind, ExecutionResult, HealingEvent,
    HealingTier, LocatorCandidate,
};
use chrono::Utc;
use l6_timeline::{StepContext, TraceRecorder};
use selfheal_event_bus::{EventBus, NullBus};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OwnedMutexGuard;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::HealingConfig;
use crate::errors::{FlowError, ProviderError};
use crate::events::{FlowEvent, HealingState};
use crate::executor::{with_deadline, CandidateOrigin, StepExecutor};
use crate::provider::{HealRequest, HealingProvider};
use crate::session::Session;

/// Final result of one step after healing
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// Result of the successful attempt
    pub result: ExecutionResult,
    /// Attempts made, including the successful one
    pub attempts: u32,
    /// Tier that rescued the step, if any
    pub healed: Option<HealingTier>,
}

/// Outcome of a Tier-1 suggestion round before re-execution
enum Suggestion {
    Candidate(LocatorCandidate),
    Nothing,
    Failed(ErrorKind, String),
}

pub struct HealingOrchestrator {
    config: HealingConfig,
    executor: StepExecutor,
    provider: Arc<dyn HealingProvider>,
    recorder: Arc<TraceRecorder>,
    events: Arc<dyn EventBus<FlowEvent>>,
}

impl HealingOrchestrator {
    pub fn new(
        config: HealingConfig,
        provider: Arc<dyn HealingProvider>,
        recorder: Arc<TraceRecorder>,
    ) -> Result<Self, FlowError> {
        config.validate()?;
        let resolver = Arc::new(LocatorResolver::new(config.confidence_floor));
        let executor = StepExecutor::new(resolver).with_driver_timeout(config.driver_timeout());
        Ok(Self {
            config,
            executor,
            provider,
            recorder,
            events: Arc::new(NullBus),
        })
    }

    pub fn with_events(mut self, events: Arc<dyn EventBus<FlowEvent>>) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &HealingConfig {
        &self.config
    }

    pub fn recorder(&self) -> &Arc<TraceRecorder> {
        &self.recorder
    }

    pub fn executor(&self) -> &StepExecutor {
        &self.executor
    }

    pub(crate) fn events(&self) -> &Arc<dyn EventBus<FlowEvent>> {
        &self.events
    }

    /// Run one step to success or terminal failure
    pub async fn run_step(
        &self,
        step: &ActionStep,
        session: &mut Session,
    ) -> Result<StepOutcome, FlowError> {
        self.events.publish(FlowEvent::StepStarted {
            run_id: session.run_id().clone(),
            step_id: step.id.clone(),
            kind: step.kind,
        });
        self.transition(session, step, HealingState::Init, 0);

        let page_url = self.executor.current_url(session).await?;
        let context = StepContext::new(step, page_url);

        self.transition(session, step, HealingState::Executing, 0);
        let selected = self
            .executor
            .select_candidate(step, session, &context)
            .await?;
        let original = selected.as_ref().map(|s| s.candidate.clone());
        let result = self
            .executor
            .execute_with(step, session, original.as_ref(), 1)
            .await?;
        self.recorder
            .record(step, &context, result.clone(), None)
            .await;

        if result.success {
            return Ok(self.succeed(session, step, result, 1, None));
        }

        let mut attempts = vec![result];
        self.transition(session, step, HealingState::LocatorFailed, 1);

        if let Some(cached) = selected
            .as_ref()
            .filter(|selected| selected.origin == CandidateOrigin::Cache)
        {
            let _guard = lock_fingerprint(session, &context).await?;
            session
                .cache_mut()
                .invalidate(&context.fingerprint, &cached.candidate);
        }

        if !step.has_target() {
            let reason = describe_failure(&attempts[0]);
            self.finish(session, step, false, 1);
            return Err(FlowError::StepFailed {
                step_id: step.id.clone(),
                reason,
            });
        }

        let mut failed: Vec<LocatorCandidate> = original.iter().cloned().collect();

        if self.config.tier1_attempts > 0 {
            let (failing, attempted) = escalation_fields(&failed);
            warn!(
                step_id = %step.id,
                tier = 1,
                attempt = attempts.len(),
                failing = %failing,
                attempted = %attempted,
                error = attempts
                    .last()
                    .and_then(|r| r.error_kind)
                    .map(|k| k.name())
                    .unwrap_or("unknown"),
                "locator failed; escalating to tier-1 healing"
            );
        }

        for tier_attempt in 1..=self.config.tier1_attempts {
            self.transition(session, step, HealingState::Tier1Healing, attempts.len() as u32);
            let attempt_no = attempts.len() as u32 + 1;
            let started = Instant::now();
            let last_error = attempts.last().and_then(|r| r.error_kind);

            let _guard = lock_fingerprint(session, &context).await?;

            let peer = session
                .cache()
                .shared()
                .and_then(|shared| shared.get(&context.fingerprint))
                .filter(|candidate| !tried(&failed, candidate));
            let suggestion = match peer {
                Some(candidate) => {
                    debug!(
                        step_id = %step.id,
                        locator = %candidate,
                        "reusing locator healed by another run"
                    );
                    Suggestion::Candidate(candidate.with_source(CandidateSource::HealedTier1))
                }
                None => {
                    self.suggest(step, session, &context, tier_attempt, &failed, last_error)
                        .await?
                }
            };

            let (result, healed_locator) = match suggestion {
                Suggestion::Candidate(candidate) => {
                    let made = attempts.len() as u32;
                    self.transition(session, step, HealingState::ReExecuting, made);
                    let result = self
                        .executor
                        .execute_with(step, session, Some(&candidate), attempt_no)
                        .await?;
                    if result.success {
                        session
                            .cache_mut()
                            .write(context.fingerprint.clone(), candidate.clone());
                    } else {
                        session
                            .cache_mut()
                            .invalidate(&context.fingerprint, &candidate);
                        failed.push(candidate.clone());
                    }
                    (result, Some(candidate))
                }
                Suggestion::Nothing => (
                    ExecutionResult::failed(
                        &step.id,
                        attempt_no,
                        None,
                        ErrorKind::HealingUnavailable,
                        "healing provider suggested no locator",
                        elapsed_ms(started),
                    )
                    .with_source(CandidateSource::HealedTier1),
                    None,
                ),
                Suggestion::Failed(kind, message) => (
                    ExecutionResult::failed(
                        &step.id,
                        attempt_no,
                        None,
                        kind,
                        message,
                        elapsed_ms(started),
                    )
                    .with_source(CandidateSource::HealedTier1),
                    None,
                ),
            };

            let event = HealingEvent {
                step_id: step.id.clone(),
                fingerprint: context.fingerprint.clone(),
                tier: HealingTier::Tier1,
                attempt: tier_attempt,
                original_locator: original.clone(),
                healed_locator,
                success: result.success,
                duration_ms: elapsed_ms(started),
                error_message: result.error_message.clone(),
                occurred_at: Utc::now(),
            };
            self.recorder
                .record(step, &context, result.clone(), Some(event))
                .await;

            if result.success {
                info!(
                    step_id = %step.id,
                    attempt = attempt_no,
                    locator = %result
                        .locator_used
                        .as_ref()
                        .map(|c| c.to_string())
                        .unwrap_or_default(),
                    "step healed by replacement locator"
                );
                self.transition(session, step, HealingState::Tier1Success, attempt_no);
                let healed = Some(HealingTier::Tier1);
                return Ok(self.succeed(session, step, result, attempt_no, healed));
            }
            attempts.push(result);
        }

        self.transition(session, step, HealingState::Tier1Exhausted, attempts.len() as u32);

        if self.config.tier2_attempts > 0 {
            let (failing, attempted) = escalation_fields(&failed);
            warn!(
                step_id = %step.id,
                tier = 2,
                attempt = attempts.len(),
                failing = %failing,
                attempted = %attempted,
                "replacement locators exhausted; escalating to tier-2 direct action"
            );
        }

        for tier_attempt in 1..=self.config.tier2_attempts {
            self.transition(session, step, HealingState::Tier2Healing, attempts.len() as u32);
            let attempt_no = attempts.len() as u32 + 1;
            let started = Instant::now();
            let request = HealRequest {
                step: step.clone(),
                fingerprint: context.fingerprint.clone(),
                page_url: context.page_url.clone(),
                tier: HealingTier::Tier2,
                attempt: tier_attempt,
                failed_locators: failed.clone(),
                last_error: attempts.last().and_then(|r| r.error_kind),
            };
            let handle = session.driver().debug_handle();
            let outcome = session
                .guard(timeout(
                    self.config.healing_timeout(),
                    self.provider.execute_action(&handle, &request),
                ))
                .await?;

            let result = match outcome {
                Ok(Ok(true)) => ExecutionResult::succeeded(
                    &step.id,
                    attempt_no,
                    None,
                    CandidateSource::HealedTier2,
                    elapsed_ms(started),
                ),
                Ok(Ok(false)) => ExecutionResult::failed(
                    &step.id,
                    attempt_no,
                    None,
                    ErrorKind::ProviderFailed,
                    "direct action reported failure",
                    elapsed_ms(started),
                ),
                Ok(Err(err)) => ExecutionResult::failed(
                    &step.id,
                    attempt_no,
                    None,
                    provider_error_kind(&err),
                    err.to_string(),
                    elapsed_ms(started),
                ),
                Err(_) => ExecutionResult::failed(
                    &step.id,
                    attempt_no,
                    None,
                    ErrorKind::ProviderFailed,
                    ProviderError::Timeout(self.config.healing_timeout_ms).to_string(),
                    elapsed_ms(started),
                ),
            }
            .with_source(CandidateSource::HealedTier2);

            let event = HealingEvent {
                step_id: step.id.clone(),
                fingerprint: context.fingerprint.clone(),
                tier: HealingTier::Tier2,
                attempt: tier_attempt,
                original_locator: original.clone(),
                healed_locator: None,
                success: result.success,
                duration_ms: elapsed_ms(started),
                error_message: result.error_message.clone(),
                occurred_at: Utc::now(),
            };
            self.recorder
                .record(step, &context, result.clone(), Some(event))
                .await;

            if result.success {
                info!(step_id = %step.id, attempt = attempt_no, "step completed by direct action");
                self.transition(session, step, HealingState::Tier2ActionExecuted, attempt_no);
                let healed = Some(HealingTier::Tier2);
                return Ok(self.succeed(session, step, result, attempt_no, healed));
            }
            attempts.push(result);
        }

        let total = attempts.len() as u32;
        self.transition(session, step, HealingState::Tier2Exhausted, total);
        self.transition(session, step, HealingState::TerminalFailure, total);
        self.finish(session, step, false, total);
        let (failing, attempted) = escalation_fields(&failed);
        warn!(
            step_id = %step.id,
            tier = 2,
            attempt = total,
            failing = %failing,
            attempted = %attempted,
            "healing exhausted; step failed terminally"
        );
        Err(FlowError::HealingExhausted {
            step_id: step.id.clone(),
            attempts,
        })
    }

    /// Find a replacement locator on a fresh snapshot: the best untried
    /// confirmed resolver candidate, else whatever the provider suggests
    async fn suggest(
        &self,
        step: &ActionStep,
        session: &Session,
        context: &StepContext,
        tier_attempt: u32,
        failed: &[LocatorCandidate],
        last_error: Option<ErrorKind>,
    ) -> Result<Suggestion, FlowError> {
        let driver = session.driver();
        let snapshot = match session
            .drive(with_deadline(self.config.driver_timeout(), driver.snapshot()))
            .await?
        {
            Ok(snapshot) => snapshot,
            Err(err) => {
                return Ok(Suggestion::Failed(
                    ErrorKind::DriverError,
                    format!("snapshot for healing failed: {err}"),
                ))
            }
        };

        match self
            .executor
            .resolver()
            .resolve(&step.target_description, &snapshot)
        {
            Ok(resolution) => {
                let fresh = resolution
                    .confirmed()
                    .map(|scored| &scored.candidate)
                    .find(|candidate| !tried(failed, candidate));
                if let Some(candidate) = fresh {
                    debug!(
                        step_id = %step.id,
                        locator = %candidate,
                        "resolver found a replacement on the fresh snapshot"
                    );
                    return Ok(Suggestion::Candidate(
                        candidate.with_source(CandidateSource::HealedTier1),
                    ));
                }
            }
            Err(err) => {
                debug!(step_id = %step.id, error = %err, "resolver skipped during healing");
            }
        }

        let request = HealRequest {
            step: step.clone(),
            fingerprint: context.fingerprint.clone(),
            page_url: snapshot.url.clone(),
            tier: HealingTier::Tier1,
            attempt: tier_attempt,
            failed_locators: failed.to_vec(),
            last_error,
        };
        let outcome = session
            .guard(timeout(
                self.config.healing_timeout(),
                self.provider.suggest_locator(&snapshot, &request),
            ))
            .await?;

        Ok(match outcome {
            Ok(Ok(Some(candidate))) => {
                Suggestion::Candidate(candidate.with_source(CandidateSource::HealedTier1))
            }
            Ok(Ok(None)) => Suggestion::Nothing,
            Ok(Err(err)) => {
                debug!(
                    step_id = %step.id,
                    provider = self.provider.name(),
                    error = %err,
                    "suggestion failed"
                );
                Suggestion::Failed(provider_error_kind(&err), err.to_string())
            }
            Err(_) => Suggestion::Failed(
                ErrorKind::ProviderFailed,
                ProviderError::Timeout(self.config.healing_timeout_ms).to_string(),
            ),
        })
    }

    fn succeed(
        &self,
        session: &mut Session,
        step: &ActionStep,
        result: ExecutionResult,
        attempts: u32,
        healed: Option<HealingTier>,
    ) -> StepOutcome {
        if step.kind == ActionKind::Navigate {
            if let Some(url) = &step.value {
                session.record_navigation(url.clone());
            }
        }
        self.transition(session, step, HealingState::Success, attempts);
        self.finish(session, step, true, attempts);
        StepOutcome {
            result,
            attempts,
            healed,
        }
    }

    fn transition(&self, session: &Session, step: &ActionStep, state: HealingState, attempt: u32) {
        debug!(step_id = %step.id, state = %state, attempt, "healing state");
        self.events.publish(FlowEvent::StateChanged {
            run_id: session.run_id().clone(),
            step_id: step.id.clone(),
            state,
            attempt,
        });
    }

    fn finish(&self, session: &Session, step: &ActionStep, success: bool, attempts: u32) {
        self.events.publish(FlowEvent::StepFinished {
            run_id: session.run_id().clone(),
            step_id: step.id.clone(),
            success,
            attempts,
        });
    }
}

/// Hold the shared cache's heal lock for the step's fingerprint, if any
async fn lock_fingerprint(
    session: &Session,
    context: &StepContext,
) -> Result<Option<OwnedMutexGuard<()>>, FlowError> {
    let lock = session
        .cache()
        .shared()
        .map(|shared| shared.heal_lock(&context.fingerprint));
    match lock {
        Some(lock) => Ok(Some(session.guard(lock.lock_owned()).await?)),
        None => Ok(None),
    }
}

/// `(failing, attempted)` for escalation logs: the most recent failed
/// locator and every locator tried so far, oldest first
fn escalation_fields(failed: &[LocatorCandidate]) -> (String, String) {
    let failing = failed
        .last()
        .map(|candidate| candidate.to_string())
        .unwrap_or_else(|| "none".to_string());
    let attempted = if failed.is_empty() {
        "none".to_string()
    } else {
        failed
            .iter()
            .map(|candidate| candidate.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };
    (failing, attempted)
}

fn tried(failed: &[LocatorCandidate], candidate: &LocatorCandidate) -> bool {
    failed
        .iter()
        .any(|seen| seen.strategy == candidate.strategy && seen.selector == candidate.selector)
}

fn provider_error_kind(err: &ProviderError) -> ErrorKind {
    match err {
        ProviderError::Unsupported(_) => ErrorKind::HealingUnavailable,
        _ => ErrorKind::ProviderFailed,
    }
}

fn describe_failure(result: &ExecutionResult) -> String {
    match (&result.error_kind, &result.error_message) {
        (_, Some(message)) => message.clone(),
        (Some(kind), None) => kind.name().to_string(),
        (None, None) => "unknown failure".to_string(),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
