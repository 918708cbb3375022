use crate::config::{DropPolicy, RunConfig};
use crate::engine::runner::LoadTestRunner;
use crate::report::samples::CsvSampleWriter;
use crate::report::{print_summary, write_summary_export, ReportGenerator};
use crate::utils::{format_duration, parse_duration};
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub rate: Option<u32>,
    pub time_unit: Option<String>,
    pub duration: Option<String>,
    pub vus: Option<u32>,
    pub max_vus: Option<u32>,
    pub drop_policy: Option<DropPolicy>,
    pub graceful_stop: Option<String>,
    pub insecure: bool,
}

impl Overrides {
    pub fn apply(&self, config: &mut RunConfig) -> Result<()> {
        let scenario = &mut config.scenario;

        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        if let Some(rate) = self.rate {
            scenario.rate = rate;
        }
        if let Some(time_unit) = &self.time_unit {
            scenario.time_unit = parse_duration(time_unit).context("--time-unit")?;
        }
        if let Some(duration) = &self.duration {
            scenario.duration = parse_duration(duration).context("--duration")?;
        }
        if let Some(vus) = self.vus {
            scenario.pre_allocated_vus = vus;
        }
        if let Some(max_vus) = self.max_vus {
            scenario.max_vus = max_vus;
        }
        if let Some(policy) = self.drop_policy {
            scenario.drop_policy = policy;
        }
        if let Some(graceful_stop) = &self.graceful_stop {
            scenario.graceful_stop = parse_duration(graceful_stop).context("--graceful-stop")?;
        }
        if self.insecure {
            config.insecure = true;
        }
        Ok(())
    }
}

pub struct RunOptions {
    pub config: Option<PathBuf>,
    pub overrides: Overrides,
    pub summary_export: Option<PathBuf>,
    pub out_csv: Option<PathBuf>,
    pub report: Option<String>,
    pub report_dir: PathBuf,
    pub quiet: bool,
}

/// Loads the config file (or the defaults) and layers the overrides on top.
pub fn resolve_config(path: Option<&Path>, overrides: &Overrides) -> Result<RunConfig> {
    let mut config = match path {
        Some(path) => RunConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => RunConfig::default(),
    };
    overrides.apply(&mut config)?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Runs the load test and returns the process exit status.
pub async fn handle_run(options: RunOptions) -> Result<u8> {
    let config = resolve_config(options.config.as_deref(), &options.overrides)?;
    let endpoint = config.endpoint(crate::scenario::register::REGISTER_PATH)?;

    if !options.quiet {
        let scenario = &config.scenario;
        println!("{} Starting load test", "→".cyan());
        println!("Target: {}", endpoint.as_str().bright_white());
        println!("Executor: {}", scenario.executor.to_string().bright_white());
        println!(
            "Rate: {} per {}",
            scenario.rate.to_string().bright_white(),
            format_duration(scenario.time_unit)
        );
        println!(
            "Duration: {}",
            format_duration(scenario.total_duration()).bright_white()
        );
        println!(
            "VUs: {} pre-allocated, {} max",
            scenario.pre_allocated_vus.to_string().bright_white(),
            scenario.max_vus.to_string().bright_white()
        );
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, stopping");
                cancel.cancel();
            }
        });
    }

    let show_progress = !options.quiet && atty::is(atty::Stream::Stdout);
    let mut runner = LoadTestRunner::new(config)
        .context("Invalid configuration")?
        .with_progress(show_progress)
        .with_cancellation(cancel);

    let sample_writer = match &options.out_csv {
        Some(path) => {
            let (sink, writer) = CsvSampleWriter::create(path)?;
            runner = runner.with_samples(sink);
            Some((path.clone(), writer))
        }
        None => None,
    };

    let summary = runner.run().await?;

    print_summary(&summary);

    if let Some((path, writer)) = sample_writer {
        let rows = writer.finish().await?;
        println!(
            "{} Wrote {} samples to {}",
            "✔".green(),
            rows,
            path.display()
        );
    }

    if let Some(path) = &options.summary_export {
        write_summary_export(&summary, path)?;
        println!("{} Summary exported to {}", "✔".green(), path.display());
    }

    if let Some(formats) = &options.report {
        let files = ReportGenerator::generate_reports(&summary, formats, &options.report_dir)?;
        for file in files {
            println!("{} Report written to {}", "✔".green(), file.display());
        }
    }

    Ok(summary.exit_code())
}
