//! Flow execution and self-healing
//!
//! This crate drives a plan of action steps against one browser session:
//! - [`StepExecutor`] performs a single attempt and never raises on a
//!   missing element
//! - [`HealingOrchestrator`] escalates failures through Tier-1 (replacement
//!   locator) and Tier-2 (direct action) healing
//! - [`FlowRunner`] runs a whole plan and reports partial success

pub mod config;
pub mod errors;
pub mod events;
pub mod executor;
pub mod orchestrator;
pub mod provider;
pub mod runner;
pub mod session;

pub use config::HealingConfig;
pub use errors::{FlowError, ProviderError};
pub use events::{FlowEvent, HealingState};
pub use executor::{CandidateOrigin, SelectedCandidate, StepExecutor};
pub use orchestrator::{HealingOrchestrator, StepOutcome};
pub use provider::openai::{OpenAiHealingProvider, OpenAiProviderConfig};
pub use provider::{HealRequest, HealingProvider, NoopHealingProvider};
pub use runner::{validate_plan, FlowRunner, RunAborted, RunReport, StepFailure, StepOutputRecord};
pub use session::Session;
