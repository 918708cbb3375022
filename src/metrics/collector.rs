//! Concurrency-safe accumulation of request outcomes and check results.

use crate::metrics::outcome::{ErrorKind, RequestOutcome};
use crate::metrics::summary::{CheckCounts, CounterStat, MetricsSnapshot, RateStat};
use crate::metrics::trend::Trend;
use crate::report::samples::{Sample, SampleSink};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

const SHARD_COUNT: usize = 16;

/// One lock-protected slice of the aggregate. Every field merges by sum,
/// min or max, so the merged result does not depend on which shard saw
/// which sample.
#[derive(Debug, Default, Clone)]
struct Shard {
    request_duration: Trend,
    iteration_duration: Trend,
    requests: u64,
    failed: u64,
    bytes_sent: u64,
    bytes_received: u64,
    status_codes: BTreeMap<u16, u64>,
    transport_errors: BTreeMap<ErrorKind, u64>,
    checks: BTreeMap<String, CheckCounts>,
}

impl Shard {
    fn merge(&mut self, other: &Shard) {
        self.request_duration.merge(&other.request_duration);
        self.iteration_duration.merge(&other.iteration_duration);
        self.requests += other.requests;
        self.failed += other.failed;
        self.bytes_sent += other.bytes_sent;
        self.bytes_received += other.bytes_received;
        for (status, count) in &other.status_codes {
            *self.status_codes.entry(*status).or_insert(0) += count;
        }
        for (kind, count) in &other.transport_errors {
            *self.transport_errors.entry(*kind).or_insert(0) += count;
        }
        for (name, counts) in &other.checks {
            let entry = self.checks.entry(name.clone()).or_default();
            entry.passes += counts.passes;
            entry.fails += counts.fails;
        }
    }
}

/// Cheap running totals for progress display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiveCounts {
    pub requests: u64,
    pub failed: u64,
    pub iterations: u64,
    pub dropped: u64,
}

pub struct MetricsCollector {
    shards: Vec<Mutex<Shard>>,
    next_shard: AtomicUsize,
    requests: AtomicU64,
    failed: AtomicU64,
    iterations: AtomicU64,
    dropped_iterations: AtomicU64,
    aborted_iterations: AtomicU64,
    samples: Option<SampleSink>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| Mutex::new(Shard::default())).collect(),
            next_shard: AtomicUsize::new(0),
            requests: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            iterations: AtomicU64::new(0),
            dropped_iterations: AtomicU64::new(0),
            aborted_iterations: AtomicU64::new(0),
            samples: None,
        }
    }

    /// Streams every recorded request to `sink` in addition to aggregating it.
    pub fn with_samples(mut self, sink: SampleSink) -> Self {
        self.samples = Some(sink);
        self
    }

    fn shard(&self) -> &Mutex<Shard> {
        let index = self.next_shard.fetch_add(1, Ordering::Relaxed) % self.shards.len();
        &self.shards[index]
    }

    pub fn record_request(&self, outcome: RequestOutcome) {
        let failed = outcome.is_failed();

        if let Some(sink) = &self.samples {
            // The writer going away only loses the raw export, never the aggregate.
            let _ = sink.send(Sample::from_outcome(&outcome));
        }

        {
            let mut shard = self.shard().lock();
            shard.request_duration.record(outcome.latency());
            shard.requests += 1;
            if failed {
                shard.failed += 1;
            }
            shard.bytes_sent += outcome.bytes_sent();
            shard.bytes_received += outcome.bytes_received();
            match outcome.error() {
                Some(error) if outcome.status() == 0 => {
                    *shard.transport_errors.entry(error.kind).or_insert(0) += 1;
                }
                Some(error) => {
                    *shard.transport_errors.entry(error.kind).or_insert(0) += 1;
                    *shard.status_codes.entry(outcome.status()).or_insert(0) += 1;
                }
                None => {
                    *shard.status_codes.entry(outcome.status()).or_insert(0) += 1;
                }
            }
        }

        self.requests.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_check(&self, name: &str, passed: bool) {
        let mut shard = self.shard().lock();
        if !shard.checks.contains_key(name) {
            shard.checks.insert(name.to_string(), CheckCounts::default());
        }
        if let Some(counts) = shard.checks.get_mut(name) {
            if passed {
                counts.passes += 1;
            } else {
                counts.fails += 1;
            }
        }
    }

    pub fn record_iteration(&self, duration: Duration) {
        self.shard().lock().iteration_duration.record(duration);
        self.iterations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_iteration(&self) {
        self.dropped_iterations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_aborted_iteration(&self) {
        self.aborted_iterations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn live(&self) -> LiveCounts {
        LiveCounts {
            requests: self.requests.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            iterations: self.iterations.load(Ordering::Relaxed),
            dropped: self.dropped_iterations.load(Ordering::Relaxed),
        }
    }

    /// Merges every shard into one aggregate; `elapsed` scales the per-second rates.
    pub fn snapshot(&self, elapsed: Duration) -> MetricsSnapshot {
        let mut merged = Shard::default();
        for shard in &self.shards {
            merged.merge(&shard.lock());
        }

        let checks_passed: u64 = merged.checks.values().map(|c| c.passes).sum();
        let checks_total: u64 = merged.checks.values().map(|c| c.passes + c.fails).sum();

        MetricsSnapshot {
            elapsed,
            http_reqs: CounterStat::over(merged.requests, elapsed),
            http_req_failed: RateStat::of(merged.failed, merged.requests),
            http_req_duration: merged.request_duration.stats(),
            iterations: CounterStat::over(merged.iteration_duration.count(), elapsed),
            iteration_duration: merged.iteration_duration.stats(),
            dropped_iterations: CounterStat::over(
                self.dropped_iterations.load(Ordering::Relaxed),
                elapsed,
            ),
            aborted_iterations: CounterStat::over(
                self.aborted_iterations.load(Ordering::Relaxed),
                elapsed,
            ),
            checks: RateStat::of(checks_passed, checks_total),
            check_breakdown: merged.checks,
            status_codes: merged.status_codes,
            transport_errors: merged.transport_errors,
            data_sent: CounterStat::over(merged.bytes_sent, elapsed),
            data_received: CounterStat::over(merged.bytes_received, elapsed),
            request_trend: merged.request_duration,
            iteration_trend: merged.iteration_duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::outcome::RequestError;
    use std::sync::Arc;

    #[test]
    fn test_records_counts_and_breakdowns() {
        let collector = MetricsCollector::new();
        collector.record_request(RequestOutcome::response(200, Duration::from_millis(10), 100, 50));
        collector.record_request(RequestOutcome::response(200, Duration::from_millis(20), 100, 50));
        collector.record_request(RequestOutcome::response(500, Duration::from_millis(30), 100, 10));
        collector.record_request(RequestOutcome::transport_error(
            Duration::from_millis(1),
            100,
            RequestError {
                kind: ErrorKind::Connect,
                message: "refused".to_string(),
            },
        ));
        collector.record_check("status is 200", true);
        collector.record_check("status is 200", true);
        collector.record_check("status is 200", false);
        collector.record_check("status is 200", false);
        collector.record_dropped_iteration();

        let snapshot = collector.snapshot(Duration::from_secs(2));
        assert_eq!(snapshot.http_reqs.count, 4);
        assert_eq!(snapshot.http_reqs.rate, 2.0);
        assert_eq!(snapshot.http_req_failed.hits, 2);
        assert_eq!(snapshot.http_req_failed.total, 4);
        assert_eq!(snapshot.http_req_failed.rate, 0.5);
        assert_eq!(snapshot.status_codes.get(&200), Some(&2));
        assert_eq!(snapshot.status_codes.get(&500), Some(&1));
        assert_eq!(snapshot.status_codes.get(&0), None);
        assert_eq!(snapshot.transport_errors.get(&ErrorKind::Connect), Some(&1));
        assert_eq!(snapshot.checks.hits, 2);
        assert_eq!(snapshot.checks.total, 4);
        assert_eq!(snapshot.check_breakdown["status is 200"].fails, 2);
        assert_eq!(snapshot.dropped_iterations.count, 1);
        assert_eq!(snapshot.data_sent.count, 400);
        assert_eq!(snapshot.data_received.count, 110);
        assert_eq!(snapshot.http_req_duration.max, 30.0);
    }

    #[test]
    fn test_concurrent_writers_lose_nothing() {
        let collector = Arc::new(MetricsCollector::new());
        let threads: Vec<_> = (0..8)
            .map(|t| {
                let collector = Arc::clone(&collector);
                std::thread::spawn(move || {
                    for i in 0..1_000u64 {
                        let status = if (t + i) % 10 == 0 { 503 } else { 200 };
                        collector.record_request(RequestOutcome::response(
                            status,
                            Duration::from_micros(500 + i),
                            1,
                            1,
                        ));
                        collector.record_iteration(Duration::from_micros(600 + i));
                    }
                })
            })
            .collect();
        for handle in threads {
            handle.join().unwrap();
        }

        let snapshot = collector.snapshot(Duration::from_secs(1));
        assert_eq!(snapshot.http_reqs.count, 8_000);
        assert_eq!(snapshot.iterations.count, 8_000);
        assert_eq!(snapshot.http_req_duration.count, 8_000);
        assert_eq!(snapshot.http_req_failed.hits, 800);
        assert_eq!(collector.live().requests, 8_000);
        assert_eq!(collector.live().failed, 800);
    }
}
