pub mod collector;
pub mod outcome;
pub mod summary;
pub mod threshold;
pub mod trend;

pub use collector::{LiveCounts, MetricsCollector};
pub use outcome::{ErrorKind, RequestError, RequestOutcome};
pub use summary::{MetricsSnapshot, RunOutcome, RunSummary};
pub use threshold::{MetricName, ThresholdResult, ThresholdSet, ThresholdSpec};
pub use trend::{Trend, TrendStats};
