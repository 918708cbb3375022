use crate::metrics::collector::MetricsCollector;
use crate::metrics::outcome::RequestOutcome;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything one scenario invocation may touch. A fresh context is built
/// for every tick; nothing in it is shared mutably between iterations.
#[derive(Clone)]
pub struct IterationContext {
    iteration: u64,
    vu: u32,
    cancel: CancellationToken,
    metrics: Arc<MetricsCollector>,
}

impl IterationContext {
    pub fn new(
        iteration: u64,
        vu: u32,
        cancel: CancellationToken,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            iteration,
            vu,
            cancel,
            metrics,
        }
    }

    /// Run-wide sequence number of the tick that started this iteration.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn vu(&self) -> u32 {
        self.vu
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the run is being torn down.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub fn record_request(&self, outcome: RequestOutcome) {
        self.metrics.record_request(outcome);
    }

    /// Records a named check and returns whether it passed.
    pub fn check(&self, name: &str, passed: bool) -> bool {
        self.metrics.record_check(name, passed);
        passed
    }
}

impl std::fmt::Debug for IterationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IterationContext")
            .field("iteration", &self.iteration)
            .field("vu", &self.vu)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
