//! Single-attempt step execution

use action_locator::{LocatorError, LocatorResolver};
use action_primitives::{
    ActionKind, ActionStep, AssertionKind, CandidateSource, DriverError, ErrorKind,
    ExecutionResult, Locator, LocatorCandidate, StepOutput,
};
use l6_timeline::StepContext;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::debug;

use crate::errors::FlowError;
use crate::session::Session;

const DEFAULT_DRIVER_TIMEOUT: Duration = Duration::from_secs(10);

/// Where the candidate for an attempt came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateOrigin {
    Cache,
    Declared,
    Resolved,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectedCandidate {
    pub candidate: LocatorCandidate,
    pub origin: CandidateOrigin,
}

/// Performs one attempt of one step against the session's driver.
///
/// Element-level failures come back as unsuccessful [`ExecutionResult`]s.
/// Only session loss and cancellation surface as [`FlowError`].
pub struct StepExecutor {
    resolver: Arc<LocatorResolver>,
    driver_timeout: Duration,
}

impl StepExecutor {
    pub fn new(resolver: Arc<LocatorResolver>) -> Self {
        Self {
            resolver,
            driver_timeout: DEFAULT_DRIVER_TIMEOUT,
        }
    }

    /// Bound for snapshot and URL calls made outside a step's own timeout
    pub fn with_driver_timeout(mut self, driver_timeout: Duration) -> Self {
        self.driver_timeout = driver_timeout;
        self
    }

    pub fn resolver(&self) -> &Arc<LocatorResolver> {
        &self.resolver
    }

    /// Execute the initial attempt of a step
    pub async fn execute(
        &self,
        step: &ActionStep,
        session: &Session,
    ) -> Result<ExecutionResult, FlowError> {
        let page_url = self.current_url(session).await?;
        let context = StepContext::new(step, page_url);
        let selected = self.select_candidate(step, session, &context).await?;
        self.execute_with(step, session, selected.as_ref().map(|s| &s.candidate), 1)
            .await
    }

    /// URL of the current page; an unreachable page yields an empty string
    pub async fn current_url(&self, session: &Session) -> Result<String, FlowError> {
        let driver = session.driver();
        let url = session
            .drive(with_deadline(self.driver_timeout, driver.current_url()))
            .await?;
        Ok(url.unwrap_or_default())
    }

    /// Pick the candidate for the initial attempt: cache, then the declared
    /// locator, then the resolver over a fresh snapshot.
    pub async fn select_candidate(
        &self,
        step: &ActionStep,
        session: &Session,
        context: &StepContext,
    ) -> Result<Option<SelectedCandidate>, FlowError> {
        if !step.has_target() {
            return Ok(None);
        }

        if let Some(candidate) = session.cache().get(&context.fingerprint) {
            debug!(step_id = %step.id, locator = %candidate, "locator cache hit");
            return Ok(Some(SelectedCandidate {
                candidate,
                origin: CandidateOrigin::Cache,
            }));
        }

        if let Some(locator) = &step.locator {
            return Ok(Some(SelectedCandidate {
                candidate: LocatorCandidate::declared(locator.clone()),
                origin: CandidateOrigin::Declared,
            }));
        }

        let driver = session.driver();
        let snapshot = match session
            .drive(with_deadline(self.driver_timeout, driver.snapshot()))
            .await?
        {
            Ok(snapshot) => snapshot,
            Err(err) => {
                debug!(step_id = %step.id, error = %err, "snapshot failed; no candidate");
                return Ok(None);
            }
        };

        match self.resolver.resolve(&step.target_description, &snapshot) {
            Ok(resolution) => {
                debug!(
                    step_id = %step.id,
                    candidates = resolution.len(),
                    confirmed = resolution.has_confirmed(),
                    "target resolved"
                );
                Ok(resolution.best().map(|scored| SelectedCandidate {
                    candidate: scored.candidate.clone(),
                    origin: CandidateOrigin::Resolved,
                }))
            }
            Err(LocatorError::EmptyDescription) => Ok(None),
            Err(err) => {
                debug!(step_id = %step.id, error = %err, "resolution failed");
                Ok(None)
            }
        }
    }

    /// Run one attempt with an explicit candidate. A targeted step without a
    /// candidate fails with `LocatorNotFound` and never touches the driver.
    pub async fn execute_with(
        &self,
        step: &ActionStep,
        session: &Session,
        candidate: Option<&LocatorCandidate>,
        attempt: u32,
    ) -> Result<ExecutionResult, FlowError> {
        let started = Instant::now();
        let step_timeout = Duration::from_millis(step.timeout_ms);

        if step.has_target() && candidate.is_none() {
            return Ok(ExecutionResult::failed(
                &step.id,
                attempt,
                None,
                ErrorKind::LocatorNotFound,
                format!("no locator candidate for '{}'", step.target_description),
                elapsed_ms(started),
            ));
        }

        let locator = candidate.map(LocatorCandidate::locator);
        let action = session
            .drive(with_deadline(
                step_timeout,
                self.perform(step, session, locator.as_ref()),
            ))
            .await?;

        let output = match action {
            Ok(output) => output,
            Err(err) => {
                debug!(step_id = %step.id, attempt, error = %err, "step attempt failed");
                return Ok(ExecutionResult::failed(
                    &step.id,
                    attempt,
                    candidate.cloned(),
                    error_kind(&err),
                    err.to_string(),
                    elapsed_ms(started),
                ));
            }
        };

        if let Some(assertion) = step.assertion {
            let remaining = step_timeout.saturating_sub(started.elapsed());
            let verdict = session
                .drive(with_deadline(
                    remaining,
                    self.check_assertion(step, session, assertion, locator.as_ref(), remaining),
                ))
                .await?;
            let failure = match verdict {
                Ok(None) => None,
                Ok(Some(reason)) => Some((ErrorKind::AssertionFailed, reason)),
                Err(err) => Some((error_kind(&err), err.to_string())),
            };
            if let Some((kind, reason)) = failure {
                return Ok(ExecutionResult::failed(
                    &step.id,
                    attempt,
                    candidate.cloned(),
                    kind,
                    reason,
                    elapsed_ms(started),
                ));
            }
        }

        let source = candidate
            .map(|candidate| candidate.source)
            .unwrap_or(CandidateSource::Declared);
        let mut result = ExecutionResult::succeeded(
            &step.id,
            attempt,
            candidate.cloned(),
            source,
            elapsed_ms(started),
        );
        if let Some(output) = output {
            result = result.with_output(output);
        }
        debug!(step_id = %step.id, attempt, "step attempt succeeded");
        Ok(result)
    }

    async fn perform(
        &self,
        step: &ActionStep,
        session: &Session,
        locator: Option<&Locator>,
    ) -> Result<Option<StepOutput>, DriverError> {
        let driver = session.driver();
        match step.kind {
            ActionKind::Navigate => {
                let url = required_value(step)?;
                driver.navigate(url).await?;
                Ok(None)
            }
            ActionKind::Click => {
                driver.click(target(step, locator)?).await?;
                Ok(None)
            }
            ActionKind::Fill => {
                driver
                    .fill(target(step, locator)?, required_value(step)?)
                    .await?;
                Ok(None)
            }
            ActionKind::Select => {
                driver
                    .select(target(step, locator)?, required_value(step)?)
                    .await?;
                Ok(None)
            }
            ActionKind::Extract => {
                let text = driver.extract_text(target(step, locator)?).await?;
                Ok(Some(StepOutput::Text(text)))
            }
            ActionKind::Wait => match locator {
                Some(locator) => {
                    driver
                        .wait_for(locator, Duration::from_millis(step.timeout_ms))
                        .await?;
                    Ok(None)
                }
                None => {
                    let pause = step
                        .value
                        .as_deref()
                        .and_then(|value| value.trim().parse::<u64>().ok())
                        .unwrap_or(0);
                    tokio::time::sleep(Duration::from_millis(pause)).await;
                    Ok(None)
                }
            },
            ActionKind::Screenshot => {
                let png = driver.screenshot().await?;
                Ok(Some(StepOutput::Screenshot(png)))
            }
        }
    }

    /// `Ok(Some(reason))` when the assertion does not hold
    async fn check_assertion(
        &self,
        step: &ActionStep,
        session: &Session,
        assertion: AssertionKind,
        locator: Option<&Locator>,
        remaining: Duration,
    ) -> Result<Option<String>, DriverError> {
        let driver = session.driver();
        let expected = step.value.as_deref().unwrap_or_default();
        match assertion {
            AssertionKind::Visible => match locator {
                Some(locator) => match driver.wait_for(locator, remaining).await {
                    Ok(()) => Ok(None),
                    Err(DriverError::ElementNotFound(_)) | Err(DriverError::Timeout(_)) => {
                        Ok(Some(format!("{locator} is not visible")))
                    }
                    Err(err) => Err(err),
                },
                None => Ok(None),
            },
            AssertionKind::TextEquals | AssertionKind::TextContains => {
                let locator = target(step, locator)?;
                let actual = driver.extract_text(locator).await?;
                let holds = if assertion == AssertionKind::TextEquals {
                    actual.trim() == expected.trim()
                } else {
                    actual.contains(expected)
                };
                Ok((!holds).then(|| format!("expected text '{expected}', found '{actual}'")))
            }
            AssertionKind::UrlContains => {
                let url = driver.current_url().await?;
                Ok((!url.contains(expected))
                    .then(|| format!("expected url containing '{expected}', found '{url}'")))
            }
        }
    }
}

/// Apply a deadline to a driver call, folding expiry into `DriverError::Timeout`
pub(crate) async fn with_deadline<T, F>(limit: Duration, call: F) -> Result<T, DriverError>
where
    F: Future<Output = Result<T, DriverError>>,
{
    match timeout(limit, call).await {
        Ok(outcome) => outcome,
        Err(_) => Err(DriverError::Timeout(format!(
            "no response within {}ms",
            limit.as_millis()
        ))),
    }
}

/// Classify a non-fatal driver error for the execution result
pub fn error_kind(err: &DriverError) -> ErrorKind {
    match err {
        DriverError::ElementNotFound(_) => ErrorKind::LocatorNotFound,
        DriverError::Timeout(_) => ErrorKind::ActionTimeout,
        DriverError::StaleElement(_) => ErrorKind::StaleElement,
        DriverError::InvalidLocator(_) | DriverError::Protocol(_) | DriverError::SessionLost(_) => {
            ErrorKind::DriverError
        }
    }
}

fn target<'a>(step: &ActionStep, locator: Option<&'a Locator>) -> Result<&'a Locator, DriverError> {
    locator.ok_or_else(|| {
        DriverError::ElementNotFound(format!("step {} has no locator", step.id))
    })
}

fn required_value(step: &ActionStep) -> Result<&str, DriverError> {
    step.value.as_deref().ok_or_else(|| {
        DriverError::Protocol(format!("{} step {} has no value", step.kind.name(), step.id))
    })
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
