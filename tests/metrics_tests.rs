use anyhow::Result;
use indexmap::IndexMap;
use stampede::metrics::outcome::{ErrorKind, RequestError};
use stampede::metrics::{MetricsCollector, RequestOutcome, ThresholdSet};
use std::sync::Arc;
use std::time::Duration;

/// A deterministic mix of fast, slow, failed and refused requests.
fn outcomes() -> Vec<RequestOutcome> {
    (0..4_000u64)
        .map(|i| {
            let latency = Duration::from_micros(200 + (i * 7919) % 250_000);
            match i % 50 {
                0 => RequestOutcome::transport_error(
                    latency,
                    96,
                    RequestError {
                        kind: ErrorKind::Timeout,
                        message: "timed out".to_string(),
                    },
                ),
                1 | 2 => RequestOutcome::response(409, latency, 96, 30),
                3 => RequestOutcome::response(500, latency, 96, 12),
                _ => RequestOutcome::response(200, latency, 96, 64),
            }
        })
        .collect()
}

fn record(collector: &MetricsCollector, outcome: &RequestOutcome) {
    collector.record_check("status is 200", outcome.status() == 200);
    collector.record_iteration(outcome.latency() + Duration::from_micros(50));
    collector.record_request(outcome.clone());
}

#[test]
fn test_concurrent_accumulation_matches_sequential() -> Result<()> {
    let all = outcomes();
    let elapsed = Duration::from_secs(10);

    let sequential = MetricsCollector::new();
    for outcome in &all {
        record(&sequential, outcome);
    }

    let concurrent = Arc::new(MetricsCollector::new());
    let chunks: Vec<Vec<RequestOutcome>> = (0..8)
        .map(|t| all.iter().skip(t).step_by(8).rev().cloned().collect())
        .collect();
    let handles: Vec<_> = chunks
        .into_iter()
        .map(|chunk| {
            let collector = Arc::clone(&concurrent);
            std::thread::spawn(move || {
                for outcome in &chunk {
                    record(&collector, outcome);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("recording thread panicked");
    }

    let expected = serde_json::to_value(sequential.snapshot(elapsed))?;
    let actual = serde_json::to_value(concurrent.snapshot(elapsed))?;
    assert_eq!(expected, actual);

    assert_eq!(expected["http_reqs"]["count"], 4_000);
    assert_eq!(expected["http_req_failed"]["hits"], 320);
    assert_eq!(expected["transport_errors"]["timeout"], 80);
    Ok(())
}

#[test]
fn test_failure_threshold_over_collected_requests() -> Result<()> {
    let mut config = IndexMap::new();
    config.insert("http_req_failed".to_string(), vec!["rate<0.01".to_string()]);
    let thresholds = ThresholdSet::from_config(&config)?;

    let collector = MetricsCollector::new();
    for i in 0..200 {
        let status = if i < 2 { 503 } else { 200 };
        collector.record_request(RequestOutcome::response(status, Duration::from_millis(3), 10, 10));
    }
    let results = thresholds.evaluate(&collector.snapshot(Duration::from_secs(1)));
    assert_eq!(results[0].actual, 0.01);
    assert!(!results[0].passed);

    collector.record_request(RequestOutcome::response(200, Duration::from_millis(3), 10, 10));
    let results = thresholds.evaluate(&collector.snapshot(Duration::from_secs(1)));
    assert!(results[0].actual < 0.01);
    assert!(results[0].passed);
    Ok(())
}

#[test]
fn test_duration_thresholds_use_milliseconds() -> Result<()> {
    let mut config = IndexMap::new();
    config.insert(
        "http_req_duration".to_string(),
        vec!["p(95)<2000".to_string(), "max<2500".to_string()],
    );
    config.insert("dropped_iterations".to_string(), vec!["count<1".to_string()]);
    let thresholds = ThresholdSet::from_config(&config)?;

    let collector = MetricsCollector::new();
    for ms in 1..=100u64 {
        collector.record_request(RequestOutcome::response(200, Duration::from_millis(ms * 30), 10, 10));
    }
    collector.record_dropped_iteration();

    let results = thresholds.evaluate(&collector.snapshot(Duration::from_secs(5)));
    assert_eq!(results.len(), 3);
    // p95 is ~2850ms, max is 3000ms
    assert!(!results[0].passed);
    assert!(results[0].actual > 2000.0);
    assert!(!results[1].passed);
    assert_eq!(results[1].actual, 3000.0);
    assert!(!results[2].passed);
    assert_eq!(results[2].actual, 1.0);
    Ok(())
}

#[test]
fn test_slow_requests_fail_default_latency_threshold() -> Result<()> {
    let mut config = IndexMap::new();
    config.insert("http_req_duration".to_string(), vec!["p(95)<2000".to_string()]);
    let thresholds = ThresholdSet::from_config(&config)?;

    let collector = MetricsCollector::new();
    collector.record_request(RequestOutcome::response(200, Duration::from_millis(1), 10, 10));
    for _ in 0..99 {
        collector.record_request(RequestOutcome::response(200, Duration::from_millis(3000), 10, 10));
    }

    let results = thresholds.evaluate(&collector.snapshot(Duration::from_secs(1)));
    assert_eq!(results[0].actual, 3000.0);
    assert!(!results[0].passed);
    Ok(())
}
