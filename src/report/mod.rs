pub mod console;
pub mod samples;

use crate::metrics::summary::{CounterStat, RateStat, RunSummary};
use crate::metrics::threshold::MetricName;
use crate::metrics::trend::TrendStats;
use anyhow::{Context, Result};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

pub use console::print_summary;
pub use samples::{CsvSampleWriter, Sample, SampleSink};

pub const REPORT_FORMATS: [&str; 2] = ["json", "html"];

pub struct ReportGenerator;

impl ReportGenerator {
    /// Writes one timestamped report per requested format into `output_dir`.
    pub fn generate_reports(
        summary: &RunSummary,
        formats: &str,
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(output_dir).with_context(|| {
            format!("Failed to create report directory {}", output_dir.display())
        })?;

        let mut generated_files = Vec::new();
        for format in formats.split(',') {
            let format = format.trim().to_lowercase();
            match format.as_str() {
                "json" => generated_files.push(Self::generate_json_report(summary, output_dir)?),
                "html" => generated_files.push(Self::generate_html_report(summary, output_dir)?),
                "" => {}
                other => tracing::warn!(
                    format = other,
                    supported = %REPORT_FORMATS.join(","),
                    "unknown report format, skipping"
                ),
            }
        }

        Ok(generated_files)
    }

    fn report_path(summary: &RunSummary, output_dir: &Path, extension: &str) -> PathBuf {
        let timestamp = summary.started_at.format("%Y%m%d_%H%M%S");
        output_dir.join(format!("stampede_report_{}.{}", timestamp, extension))
    }

    fn generate_json_report(summary: &RunSummary, output_dir: &Path) -> Result<PathBuf> {
        let path = Self::report_path(summary, output_dir, "json");
        let json = serde_json::to_string_pretty(summary)?;
        fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    fn generate_html_report(summary: &RunSummary, output_dir: &Path) -> Result<PathBuf> {
        use tera::{Context as TeraContext, Tera};

        let path = Self::report_path(summary, output_dir, "html");

        let mut tera = Tera::default();
        tera.add_raw_template("summary.html", include_str!("../../templates/summary.html"))
            .map_err(|e| anyhow::anyhow!("Failed to add template: {}", e))?;

        let mut context = TeraContext::new();
        context.insert("summary", summary);
        context.insert(
            "timestamp",
            &summary.started_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        );
        context.insert(
            "elapsed_secs",
            &format!("{:.2}", summary.metrics.elapsed.as_secs_f64()),
        );
        context.insert(
            "failure_rate",
            &format!("{:.2}", summary.metrics.http_req_failed.rate * 100.0),
        );
        context.insert("passed", &summary.passed());

        let html = tera.render("summary.html", &context)?;
        fs::write(&path, html).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }
}

fn counter_entry(stat: &CounterStat) -> Map<String, Value> {
    let mut entry = Map::new();
    entry.insert("count".into(), json!(stat.count));
    entry.insert("rate".into(), json!(stat.rate));
    entry
}

fn rate_entry(stat: &RateStat) -> Map<String, Value> {
    let mut entry = Map::new();
    entry.insert("passes".into(), json!(stat.hits));
    entry.insert("fails".into(), json!(stat.total - stat.hits));
    entry.insert("value".into(), json!(stat.rate));
    entry
}

fn trend_entry(stats: &TrendStats) -> Map<String, Value> {
    match serde_json::to_value(stats) {
        Ok(Value::Object(mut entry)) => {
            entry.remove("count");
            entry
        }
        _ => Map::new(),
    }
}

/// The end-of-run summary in the shape k6 writes with `--summary-export`,
/// so existing comparison tooling can read it.
pub fn summary_export(summary: &RunSummary) -> Value {
    let m = &summary.metrics;
    let mut metrics = Map::new();

    for name in MetricName::ALL {
        let mut entry = match name {
            MetricName::HttpReqs => counter_entry(&m.http_reqs),
            MetricName::Iterations => counter_entry(&m.iterations),
            MetricName::DroppedIterations => counter_entry(&m.dropped_iterations),
            MetricName::AbortedIterations => counter_entry(&m.aborted_iterations),
            MetricName::DataSent => counter_entry(&m.data_sent),
            MetricName::DataReceived => counter_entry(&m.data_received),
            MetricName::HttpReqFailed => rate_entry(&m.http_req_failed),
            MetricName::Checks => rate_entry(&m.checks),
            MetricName::HttpReqDuration => trend_entry(&m.http_req_duration),
            MetricName::IterationDuration => trend_entry(&m.iteration_duration),
        };

        let thresholds: Map<String, Value> = summary
            .thresholds
            .iter()
            .filter(|t| t.metric == name.as_str())
            .map(|t| (t.expression.clone(), json!({ "ok": t.passed })))
            .collect();
        if !thresholds.is_empty() {
            entry.insert("thresholds".into(), Value::Object(thresholds));
        }

        metrics.insert(name.as_str().to_string(), Value::Object(entry));
    }

    let checks: Map<String, Value> = m
        .check_breakdown
        .iter()
        .map(|(name, counts)| {
            (
                name.clone(),
                json!({ "name": name, "passes": counts.passes, "fails": counts.fails }),
            )
        })
        .collect();

    json!({
        "root_group": { "name": "", "path": "", "checks": checks },
        "state": {
            "testRunDurationMs": m.elapsed.as_secs_f64() * 1000.0,
            "outcome": summary.outcome,
        },
        "metrics": metrics,
    })
}

pub fn write_summary_export(summary: &RunSummary, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(&summary_export(summary))?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutorKind;
    use crate::engine::scheduler::SchedulerReport;
    use crate::metrics::collector::MetricsCollector;
    use crate::metrics::outcome::RequestOutcome;
    use crate::metrics::summary::RunOutcome;
    use crate::metrics::threshold::ThresholdResult;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;
    use tempfile::tempdir;

    fn sample_summary() -> RunSummary {
        let collector = MetricsCollector::new();
        for ms in [10, 20, 30, 40] {
            collector.record_request(RequestOutcome::response(200, Duration::from_millis(ms), 90, 40));
            collector.record_check("status is 200", true);
            collector.record_iteration(Duration::from_millis(ms + 1));
        }
        RunSummary {
            started_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            executor: ExecutorKind::ConstantArrivalRate,
            outcome: RunOutcome::Completed,
            scheduler: SchedulerReport {
                scheduled: 4,
                completed: 4,
                ..SchedulerReport::default()
            },
            metrics: collector.snapshot(Duration::from_secs(2)),
            thresholds: vec![ThresholdResult {
                metric: "http_req_duration".to_string(),
                expression: "p(95)<2000".to_string(),
                actual: 40.0,
                passed: true,
            }],
        }
    }

    #[test]
    fn test_summary_export_shape() {
        let export = summary_export(&sample_summary());
        let metrics = &export["metrics"];

        assert_eq!(metrics["http_reqs"]["count"], 4);
        assert_eq!(metrics["http_reqs"]["rate"], 2.0);
        assert_eq!(metrics["http_req_duration"]["max"], 40.0);
        assert_eq!(metrics["http_req_duration"]["avg"], 25.0);
        assert!(metrics["http_req_duration"]["p(95)"].is_number());
        assert!(metrics["http_req_duration"]["p(99)"].is_number());
        assert_eq!(metrics["http_req_duration"]["thresholds"]["p(95)<2000"]["ok"], true);
        assert_eq!(metrics["http_req_failed"]["value"], 0.0);
        assert_eq!(metrics["checks"]["passes"], 4);
        assert_eq!(export["state"]["outcome"]["status"], "completed");
        assert_eq!(export["root_group"]["checks"]["status is 200"]["passes"], 4);
    }

    #[test]
    fn test_generate_reports_writes_timestamped_files() -> Result<()> {
        let dir = tempdir()?;
        let summary = sample_summary();

        let files = ReportGenerator::generate_reports(&summary, "json, html,bogus", dir.path())?;
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("stampede_report_20240301_120000.json"));
        assert!(files[1].ends_with("stampede_report_20240301_120000.html"));

        let json: Value = serde_json::from_str(&fs::read_to_string(&files[0])?)?;
        assert_eq!(json["scheduler"]["scheduled"], 4);
        assert_eq!(json["outcome"]["status"], "completed");

        let html = fs::read_to_string(&files[1])?;
        assert!(html.contains("p(95)&lt;2000") || html.contains("p(95)<2000"));
        assert!(html.contains("PASSED"));
        Ok(())
    }

    #[test]
    fn test_write_summary_export_creates_parent() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("results").join("summary.json");
        write_summary_export(&sample_summary(), &path)?;
        let json: Value = serde_json::from_str(&fs::read_to_string(&path)?)?;
        assert!(json["metrics"]["http_req_duration"]["med"].is_number());
        Ok(())
    }
}
