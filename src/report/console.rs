use crate::metrics::summary::{CounterStat, RateStat, RunOutcome, RunSummary};
use crate::metrics::trend::TrendStats;
use crate::utils::format_duration;
use owo_colors::OwoColorize;

const LABEL_WIDTH: usize = 24;

fn label(name: &str) -> String {
    let dots = LABEL_WIDTH.saturating_sub(name.len());
    format!("  {}{}:", name, ".".repeat(dots).dimmed())
}

fn counter_line(name: &str, stat: &CounterStat, unit: &str) -> String {
    format!(
        "{} {}{} {}",
        label(name),
        stat.count.to_string().bright_white(),
        unit,
        format!("{:.2}{}/s", stat.rate, unit).dimmed()
    )
}

fn trend_line(name: &str, stats: &TrendStats) -> String {
    format!(
        "{} avg={} min={} med={} max={} p(90)={} p(95)={} p(99)={}",
        label(name),
        ms(stats.avg).bright_white(),
        ms(stats.min),
        ms(stats.med),
        ms(stats.max),
        ms(stats.p90),
        ms(stats.p95).bright_white(),
        ms(stats.p99)
    )
}

fn rate_line(name: &str, stat: &RateStat, hits: &str, misses: &str) -> String {
    format!(
        "{} {:.2}% {} {} {} {}",
        label(name),
        stat.rate * 100.0,
        hits,
        stat.hits,
        misses,
        stat.total - stat.hits
    )
}

fn ms(value: f64) -> String {
    if value >= 1000.0 {
        format!("{:.2}s", value / 1000.0)
    } else {
        format!("{:.2}ms", value)
    }
}

fn check_mark(passed: bool) -> String {
    if passed {
        "✓".green().to_string()
    } else {
        "✗".red().to_string()
    }
}

/// The end-of-run summary as printed to stdout.
pub fn render_summary(summary: &RunSummary) -> String {
    let metrics = &summary.metrics;
    let scheduler = &summary.scheduler;
    let rule = "=".repeat(60).dimmed().to_string();

    let mut lines = vec![
        String::new(),
        rule.clone(),
        format!(
            "{} {} finished in {}",
            "■".bright_white(),
            summary.executor.to_string().bright_white(),
            format_duration(metrics.elapsed)
        ),
        rule.clone(),
        String::new(),
        rate_line("checks", &metrics.checks, "✓", "✗"),
    ];

    lines.extend(metrics.check_breakdown.iter().map(|(name, counts)| {
        format!(
            "    {} {} ({} passed, {} failed)",
            check_mark(counts.fails == 0),
            name,
            counts.passes,
            counts.fails
        )
    }));

    lines.push(counter_line("data_received", &metrics.data_received, "B"));
    lines.push(counter_line("data_sent", &metrics.data_sent, "B"));
    lines.push(counter_line("dropped_iterations", &metrics.dropped_iterations, ""));
    if metrics.aborted_iterations.count > 0 {
        lines.push(counter_line("aborted_iterations", &metrics.aborted_iterations, ""));
    }
    lines.push(trend_line("http_req_duration", &metrics.http_req_duration));
    lines.push(rate_line("http_req_failed", &metrics.http_req_failed, "✓", "✗"));
    lines.push(counter_line("http_reqs", &metrics.http_reqs, ""));
    lines.push(trend_line("iteration_duration", &metrics.iteration_duration));
    lines.push(counter_line("iterations", &metrics.iterations, ""));
    lines.push(format!(
        "{} peak={} allocated={}",
        label("vus"),
        scheduler.peak_vus.to_string().bright_white(),
        scheduler.allocated_vus
    ));

    if !metrics.status_codes.is_empty() || !metrics.transport_errors.is_empty() {
        lines.push(String::new());
        lines.push("  Responses:".to_string());
        for (code, count) in &metrics.status_codes {
            let count = count.to_string();
            let count = if (200..300).contains(code) {
                count.green().to_string()
            } else if *code >= 400 {
                count.red().to_string()
            } else {
                count.yellow().to_string()
            };
            lines.push(format!("    {}: {}", code, count));
        }
        for (kind, count) in &metrics.transport_errors {
            lines.push(format!("    {}: {}", kind, count.to_string().red()));
        }
    }

    if !summary.thresholds.is_empty() {
        lines.push(String::new());
        lines.push("  Thresholds:".to_string());
        lines.extend(summary.thresholds.iter().map(|result| {
            format!(
                "    {} {} {} (actual {:.4})",
                check_mark(result.passed),
                result.metric,
                result.expression.bright_white(),
                result.actual
            )
        }));
    }

    lines.push(String::new());
    lines.push(match &summary.outcome {
        RunOutcome::Aborted { reason } => format!("{} Run aborted: {}", "✗".red().bold(), reason),
        RunOutcome::Completed if summary.thresholds_passed() => {
            format!("{} All thresholds passed", "✔".green().bold())
        }
        RunOutcome::Completed => format!(
            "{} {} of {} thresholds failed",
            "✗".red().bold(),
            summary.thresholds.iter().filter(|t| !t.passed).count(),
            summary.thresholds.len()
        ),
    });
    lines.push(rule);

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

pub fn print_summary(summary: &RunSummary) {
    print!("{}", render_summary(summary));
}
