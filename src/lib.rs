//! selfheal library
//!
//! Configuration, engine wiring and the `selfheal` command implementations,
//! exposed for integration testing.

pub mod cli;
pub mod config;
pub mod engine;

pub use config::{AppConfig, EngineConfig, ProviderKind, ProviderSettings};
