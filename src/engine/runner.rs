use crate::config::RunConfig;
use crate::engine::executor::TickPlan;
use crate::engine::monitor::ProgressMonitor;
use crate::engine::scheduler::RateScheduler;
use crate::error::ConfigError;
use crate::http::HttpClient;
use crate::metrics::collector::MetricsCollector;
use crate::metrics::summary::{RunOutcome, RunSummary};
use crate::metrics::threshold::ThresholdSet;
use crate::report::samples::SampleSink;
use crate::scenario::register::{RegisterScenario, REGISTER_PATH};
use crate::scenario::Scenario;
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Runs one scenario under a validated [`RunConfig`] and summarizes it.
pub struct LoadTestRunner {
    config: RunConfig,
    thresholds: ThresholdSet,
    show_progress: bool,
    cancel: CancellationToken,
    samples: Option<SampleSink>,
}

impl LoadTestRunner {
    /// Fails before anything is scheduled when the configuration is invalid.
    pub fn new(config: RunConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let thresholds = config.threshold_set()?;
        Ok(Self {
            config,
            thresholds,
            show_progress: false,
            cancel: CancellationToken::new(),
            samples: None,
        })
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_samples(mut self, sink: SampleSink) -> Self {
        self.samples = Some(sink);
        self
    }

    pub fn register_scenario(&self) -> Result<RegisterScenario> {
        let client = HttpClient::from_config(&self.config)?;
        let endpoint = self.config.endpoint(REGISTER_PATH)?;
        Ok(RegisterScenario::new(client.into_inner(), endpoint))
    }

    /// Registration load against `{baseURL}/auth/register`.
    pub async fn run(self) -> Result<RunSummary> {
        let scenario = Arc::new(self.register_scenario()?);
        Ok(self.run_scenario(scenario).await)
    }

    pub async fn run_scenario(self, scenario: Arc<dyn Scenario>) -> RunSummary {
        let LoadTestRunner {
            config,
            thresholds,
            show_progress,
            cancel,
            samples,
        } = self;

        let mut collector = MetricsCollector::new();
        if let Some(sink) = samples {
            collector = collector.with_samples(sink);
        }
        let metrics = Arc::new(collector);

        let monitor = show_progress.then(|| {
            let expected = TickPlan::from_config(&config.scenario).expected_ticks();
            ProgressMonitor::start(expected, Arc::clone(&metrics))
        });

        let scheduler = RateScheduler::new(config.scenario.clone(), Arc::clone(&metrics))
            .with_cancellation(cancel);

        let started_at = Utc::now();
        let start = Instant::now();
        let report = scheduler.run(scenario).await;
        let elapsed = start.elapsed();

        if let Some(monitor) = monitor {
            monitor.finish().await;
        }

        let snapshot = metrics.snapshot(elapsed);
        let results = thresholds.evaluate(&snapshot);
        let outcome = match &report.abort_reason {
            Some(reason) => RunOutcome::Aborted {
                reason: reason.clone(),
            },
            None => RunOutcome::Completed,
        };

        RunSummary {
            started_at,
            executor: config.scenario.executor,
            outcome,
            scheduler: report,
            metrics: snapshot,
            thresholds: results,
        }
    }
}
