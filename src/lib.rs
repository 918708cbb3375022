//! Open-model HTTP load generation.
//!
//! A [`engine::RateScheduler`] starts scenario iterations at a fixed arrival
//! rate, leasing virtual users from a bounded pool. Outcomes accumulate in a
//! [`metrics::MetricsCollector`]; at the end of the run the snapshot is
//! checked against thresholds and summarized.

pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod report;
pub mod scenario;
pub mod utils;

pub use config::{DropPolicy, ExecutorKind, RunConfig, ScenarioConfig, Stage};
pub use engine::{IterationContext, LoadTestRunner, RateScheduler, SchedulerReport};
pub use error::ConfigError;
pub use metrics::{MetricsCollector, RequestOutcome, RunOutcome, RunSummary};
pub use scenario::{RegisterScenario, Scenario};
