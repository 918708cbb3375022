//! Open-model arrival-rate scheduling.
//!
//! Ticks are started on a fixed timetable regardless of how long earlier
//! iterations take. When no VU is free the tick is dropped (or briefly
//! parked under [`DropPolicy::Queue`]) and counted, never retried.

use crate::config::{DropPolicy, ScenarioConfig};
use crate::engine::context::IterationContext;
use crate::engine::executor::TickPlan;
use crate::engine::pool::{VuLease, VuPool};
use crate::metrics::collector::MetricsCollector;
use crate::scenario::Scenario;
use crate::utils::format_duration;
use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Iteration accounting for one run.
///
/// `scheduled == completed + dropped + aborted` once the run has finished.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerReport {
    pub scheduled: u64,
    pub completed: u64,
    pub dropped: u64,
    pub aborted: u64,
    /// Most VUs busy at the same time.
    pub peak_vus: u32,
    /// Most VUs that existed at the same time.
    pub allocated_vus: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
}

impl SchedulerReport {
    pub fn is_balanced(&self) -> bool {
        self.scheduled == self.completed + self.dropped + self.aborted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IterationEnd {
    Completed,
    Dropped,
    Aborted,
}

pub struct RateScheduler {
    config: ScenarioConfig,
    metrics: Arc<MetricsCollector>,
    cancel: CancellationToken,
}

impl RateScheduler {
    pub fn new(config: ScenarioConfig, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            config,
            metrics,
            cancel: CancellationToken::new(),
        }
    }

    /// Cancelling `token` stops scheduling and aborts in-flight iterations.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub async fn run(&self, scenario: Arc<dyn Scenario>) -> SchedulerReport {
        let plan = TickPlan::from_config(&self.config);
        let span = plan.span();
        let pool = VuPool::new(self.config.pre_allocated_vus, self.config.max_vus);
        let parking = Arc::new(Semaphore::new(self.config.pre_allocated_vus.max(1) as usize));
        let iteration_token = self.cancel.child_token();

        let mut tasks: JoinSet<IterationEnd> = JoinSet::new();
        let mut report = SchedulerReport::default();
        let mut abort_reason: Option<String> = None;
        let mut warned_drop = false;

        info!(
            executor = %self.config.executor,
            scenario = scenario.name(),
            expected_ticks = plan.expected_ticks(),
            duration = %format_duration(span),
            "starting load"
        );

        let start = Instant::now();
        for (iteration, offset) in plan.enumerate() {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    abort_reason = Some("run cancelled".to_string());
                    break;
                }
                _ = sleep_until(start + offset) => {}
            }

            report.scheduled += 1;
            while let Some(joined) = tasks.try_join_next() {
                self.account(&mut report, joined);
            }

            if let Some(lease) = pool.try_lease() {
                let ctx = IterationContext::new(
                    iteration as u64,
                    lease.id(),
                    iteration_token.clone(),
                    Arc::clone(&self.metrics),
                );
                let scenario = Arc::clone(&scenario);
                let metrics = Arc::clone(&self.metrics);
                tasks.spawn(run_iteration(scenario, lease, ctx, metrics));
                continue;
            }

            let parked = match self.config.drop_policy {
                DropPolicy::Drop => None,
                DropPolicy::Queue => Arc::clone(&parking).try_acquire_owned().ok(),
            };

            match parked {
                Some(permit) => {
                    let pool = Arc::clone(&pool);
                    let scenario = Arc::clone(&scenario);
                    let metrics = Arc::clone(&self.metrics);
                    let token = iteration_token.clone();
                    let grace = self.config.grace_period;
                    tasks.spawn(async move {
                        let lease = tokio::select! {
                            lease = pool.lease_within(grace) => lease,
                            _ = token.cancelled() => return IterationEnd::Aborted,
                        };
                        drop(permit);
                        match lease {
                            Some(lease) => {
                                let ctx = IterationContext::new(
                                    iteration as u64,
                                    lease.id(),
                                    token,
                                    Arc::clone(&metrics),
                                );
                                run_iteration(scenario, lease, ctx, metrics).await
                            }
                            None => IterationEnd::Dropped,
                        }
                    });
                }
                None => {
                    if !warned_drop {
                        warn!(
                            iteration,
                            max_vus = self.config.max_vus,
                            "no VU available, dropping iterations"
                        );
                        warned_drop = true;
                    }
                    self.account(&mut report, Ok(IterationEnd::Dropped));
                }
            }
        }

        if abort_reason.is_none() {
            let deadline = start + span + self.config.graceful_stop;
            loop {
                tokio::select! {
                    joined = tasks.join_next() => match joined {
                        Some(joined) => self.account(&mut report, joined),
                        None => break,
                    },
                    _ = sleep_until(deadline) => {
                        abort_reason = Some(format!(
                            "gracefulStop of {} expired with {} iterations in flight",
                            format_duration(self.config.graceful_stop),
                            tasks.len()
                        ));
                        break;
                    }
                    _ = self.cancel.cancelled() => {
                        abort_reason = Some("run cancelled".to_string());
                        break;
                    }
                }
            }
        }

        if let Some(reason) = &abort_reason {
            warn!(reason = %reason, in_flight = tasks.len(), "aborting run");
            iteration_token.cancel();
            tasks.abort_all();
            while let Some(joined) = tasks.join_next().await {
                self.account(&mut report, joined);
            }
        }

        let stats = pool.stats();
        report.peak_vus = stats.peak_in_use;
        report.allocated_vus = stats.peak_allocated;
        report.abort_reason = abort_reason;

        info!(
            scheduled = report.scheduled,
            completed = report.completed,
            dropped = report.dropped,
            aborted = report.aborted,
            peak_vus = report.peak_vus,
            "load finished"
        );
        report
    }

    fn account(&self, report: &mut SchedulerReport, joined: Result<IterationEnd, JoinError>) {
        match joined {
            Ok(IterationEnd::Completed) => report.completed += 1,
            Ok(IterationEnd::Dropped) => {
                report.dropped += 1;
                self.metrics.record_dropped_iteration();
            }
            Ok(IterationEnd::Aborted) => {
                report.aborted += 1;
                self.metrics.record_aborted_iteration();
            }
            Err(err) if err.is_cancelled() => {
                report.aborted += 1;
                self.metrics.record_aborted_iteration();
            }
            // run_iteration catches scenario panics, so this is a panic
            // in the task itself with no iteration duration to record
            Err(err) => {
                error!(error = %err, "iteration task panicked");
                report.completed += 1;
            }
        }
    }
}

/// Runs one scenario invocation on a leased VU.
///
/// A scenario that finishes is completed even if the run was cancelled
/// while it was finishing; one still pending at cancellation is dropped
/// and counted as aborted. Panics are contained here so the iteration is
/// still recorded.
async fn run_iteration(
    scenario: Arc<dyn Scenario>,
    lease: VuLease,
    ctx: IterationContext,
    metrics: Arc<MetricsCollector>,
) -> IterationEnd {
    let started = Instant::now();
    let iteration = ctx.iteration();
    let finished = tokio::select! {
        biased;
        finished = AssertUnwindSafe(scenario.run(ctx.clone())).catch_unwind() => finished,
        _ = ctx.cancelled() => {
            debug!(iteration, "iteration interrupted");
            return IterationEnd::Aborted;
        }
    };
    drop(lease);

    if finished.is_err() {
        error!(iteration, scenario = scenario.name(), "iteration panicked");
    }
    metrics.record_iteration(started.elapsed());
    IterationEnd::Completed
}
