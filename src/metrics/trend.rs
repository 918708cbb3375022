use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Latencies above one hour are clamped.
const HIGHEST_TRACKABLE_MICROS: u64 = 3_600_000_000;

/// A mergeable latency distribution recorded in microseconds.
///
/// Percentiles come from an HDR histogram (3 significant digits); count, sum,
/// min and max are tracked exactly so averages and extremes are not rounded.
#[derive(Debug, Clone)]
pub struct Trend {
    histogram: Histogram<u64>,
    count: u64,
    sum_micros: u128,
    min_micros: u64,
    max_micros: u64,
}

impl Default for Trend {
    fn default() -> Self {
        Self::new()
    }
}

impl Trend {
    pub fn new() -> Self {
        Self {
            histogram: Histogram::new_with_bounds(1, HIGHEST_TRACKABLE_MICROS, 3)
                .expect("static histogram bounds are valid"),
            count: 0,
            sum_micros: 0,
            min_micros: u64::MAX,
            max_micros: 0,
        }
    }

    pub fn record(&mut self, value: Duration) {
        let micros = u64::try_from(value.as_micros()).unwrap_or(u64::MAX);
        self.histogram.saturating_record(micros);
        self.count += 1;
        self.sum_micros += micros as u128;
        self.min_micros = self.min_micros.min(micros);
        self.max_micros = self.max_micros.max(micros);
    }

    pub fn merge(&mut self, other: &Trend) {
        if other.count == 0 {
            return;
        }
        if let Err(err) = self.histogram.add(&other.histogram) {
            tracing::warn!(error = %err, "failed to merge latency histogram");
        }
        self.count += other.count;
        self.sum_micros += other.sum_micros;
        self.min_micros = self.min_micros.min(other.min_micros);
        self.max_micros = self.max_micros.max(other.max_micros);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn avg_ms(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum_micros as f64 / self.count as f64 / 1000.0
    }

    pub fn min_ms(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.min_micros as f64 / 1000.0
    }

    pub fn max_ms(&self) -> f64 {
        self.max_micros as f64 / 1000.0
    }

    /// Value at percentile `p` (0..=100) in milliseconds, clamped to the exact extremes.
    pub fn percentile_ms(&self, p: f64) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let quantile = (p / 100.0).clamp(0.0, 1.0);
        let micros = self
            .histogram
            .value_at_quantile(quantile)
            .clamp(self.min_micros, self.max_micros);
        micros as f64 / 1000.0
    }

    pub fn stats(&self) -> TrendStats {
        TrendStats {
            avg: self.avg_ms(),
            min: self.min_ms(),
            med: self.percentile_ms(50.0),
            max: self.max_ms(),
            p90: self.percentile_ms(90.0),
            p95: self.percentile_ms(95.0),
            p99: self.percentile_ms(99.0),
            count: self.count,
        }
    }
}

/// Summary statistics of a trend, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendStats {
    pub avg: f64,
    pub min: f64,
    pub med: f64,
    pub max: f64,
    #[serde(rename = "p(90)")]
    pub p90: f64,
    #[serde(rename = "p(95)")]
    pub p95: f64,
    #[serde(rename = "p(99)")]
    pub p99: f64,
    pub count: u64,
}
