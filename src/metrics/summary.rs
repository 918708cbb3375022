use crate::config::ExecutorKind;
use crate::engine::scheduler::SchedulerReport;
use crate::metrics::outcome::ErrorKind;
use crate::metrics::threshold::{Aggregation, MetricName, ThresholdResult};
use crate::metrics::trend::{Trend, TrendStats};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub const EXIT_THRESHOLDS_FAILED: u8 = 99;
pub const EXIT_ABORTED: u8 = 105;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CounterStat {
    pub count: u64,
    /// Per second over the run's elapsed time.
    pub rate: f64,
}

impl CounterStat {
    pub fn over(count: u64, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        Self {
            count,
            rate: if secs > 0.0 { count as f64 / secs } else { 0.0 },
        }
    }
}

/// Fraction of samples that were "hits" (failed requests, passed checks).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateStat {
    pub hits: u64,
    pub total: u64,
    pub rate: f64,
}

impl RateStat {
    pub fn of(hits: u64, total: u64) -> Self {
        Self {
            hits,
            total,
            rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckCounts {
    pub passes: u64,
    pub fails: u64,
}

/// The merged aggregate of every sample recorded during a run.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    #[serde(with = "duration_serde")]
    pub elapsed: Duration,
    pub http_reqs: CounterStat,
    pub http_req_failed: RateStat,
    pub http_req_duration: TrendStats,
    pub iterations: CounterStat,
    pub iteration_duration: TrendStats,
    pub dropped_iterations: CounterStat,
    pub aborted_iterations: CounterStat,
    pub checks: RateStat,
    pub check_breakdown: BTreeMap<String, CheckCounts>,
    pub status_codes: BTreeMap<u16, u64>,
    pub transport_errors: BTreeMap<ErrorKind, u64>,
    pub data_sent: CounterStat,
    pub data_received: CounterStat,
    #[serde(skip)]
    pub(crate) request_trend: Trend,
    #[serde(skip)]
    pub(crate) iteration_trend: Trend,
}

impl MetricsSnapshot {
    /// The value a threshold on `metric` compares against.
    pub fn aggregate(&self, metric: MetricName, aggregation: Aggregation) -> f64 {
        let counter = |stat: &CounterStat| match aggregation {
            Aggregation::Rate => stat.rate,
            _ => stat.count as f64,
        };
        let trend = |trend: &Trend| match aggregation {
            Aggregation::Avg => trend.avg_ms(),
            Aggregation::Min => trend.min_ms(),
            Aggregation::Med => trend.percentile_ms(50.0),
            Aggregation::Max => trend.max_ms(),
            Aggregation::Percentile(p) => trend.percentile_ms(p),
            Aggregation::Count | Aggregation::Rate => trend.count() as f64,
        };

        match metric {
            MetricName::HttpReqs => counter(&self.http_reqs),
            MetricName::Iterations => counter(&self.iterations),
            MetricName::DroppedIterations => counter(&self.dropped_iterations),
            MetricName::AbortedIterations => counter(&self.aborted_iterations),
            MetricName::DataSent => counter(&self.data_sent),
            MetricName::DataReceived => counter(&self.data_received),
            MetricName::HttpReqFailed => self.http_req_failed.rate,
            MetricName::Checks => self.checks.rate,
            MetricName::HttpReqDuration => trend(&self.request_trend),
            MetricName::IterationDuration => trend(&self.iteration_trend),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Aborted { reason: String },
}

/// Everything known about a finished run. Built once, read-only afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub executor: ExecutorKind,
    pub outcome: RunOutcome,
    pub scheduler: SchedulerReport,
    pub metrics: MetricsSnapshot,
    pub thresholds: Vec<ThresholdResult>,
}

impl RunSummary {
    pub fn thresholds_passed(&self) -> bool {
        self.thresholds.iter().all(|t| t.passed)
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.outcome, RunOutcome::Aborted { .. })
    }

    pub fn passed(&self) -> bool {
        !self.is_aborted() && self.thresholds_passed()
    }

    /// 0 on success, 105 when the run was cut short, 99 when a threshold failed.
    pub fn exit_code(&self) -> u8 {
        if self.is_aborted() {
            EXIT_ABORTED
        } else if !self.thresholds_passed() {
            EXIT_THRESHOLDS_FAILED
        } else {
            0
        }
    }
}

// Helper module for serializing Duration as milliseconds
pub(crate) mod duration_serde {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::collector::MetricsCollector;

    fn summary(outcome: RunOutcome, thresholds: Vec<bool>) -> RunSummary {
        RunSummary {
            started_at: Utc::now(),
            executor: ExecutorKind::ConstantArrivalRate,
            outcome,
            scheduler: SchedulerReport::default(),
            metrics: MetricsCollector::new().snapshot(Duration::from_secs(1)),
            thresholds: thresholds
                .into_iter()
                .map(|passed| ThresholdResult {
                    metric: "http_req_failed".to_string(),
                    expression: "rate<0.01".to_string(),
                    actual: 0.0,
                    passed,
                })
                .collect(),
        }
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(summary(RunOutcome::Completed, vec![]).exit_code(), 0);
        assert_eq!(summary(RunOutcome::Completed, vec![true, true]).exit_code(), 0);
        assert_eq!(
            summary(RunOutcome::Completed, vec![true, false]).exit_code(),
            EXIT_THRESHOLDS_FAILED
        );
        let aborted = RunOutcome::Aborted {
            reason: "interrupted".to_string(),
        };
        assert_eq!(summary(aborted.clone(), vec![true]).exit_code(), EXIT_ABORTED);
        assert_eq!(summary(aborted, vec![false]).exit_code(), EXIT_ABORTED);
    }

    #[test]
    fn test_counter_and_rate_stats() {
        assert_eq!(CounterStat::over(30, Duration::from_secs(3)).rate, 10.0);
        assert_eq!(CounterStat::over(30, Duration::ZERO).rate, 0.0);
        assert_eq!(RateStat::of(0, 0).rate, 0.0);
        assert_eq!(RateStat::of(1, 4).rate, 0.25);
    }

    #[test]
    fn test_snapshot_serializes_trend_names() {
        let snapshot = MetricsCollector::new().snapshot(Duration::from_millis(1500));
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["elapsed"], 1500);
        assert!(json["http_req_duration"]["p(95)"].is_number());
        assert!(json["http_req_failed"]["rate"].is_number());
        assert!(json.get("request_trend").is_none());
    }
}
