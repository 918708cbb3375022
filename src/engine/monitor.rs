use crate::metrics::collector::{LiveCounts, MetricsCollector};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const REFRESH_INTERVAL: Duration = Duration::from_millis(250);

pub fn create_progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("▕{bar:25}▏ {percent:>3}% • {pos}/{len} iterations • {elapsed_precise} • {wide_msg}")
            .expect("Invalid progress template")
            .progress_chars("█░ "),
    );
    pb
}

fn progress_message(live: &LiveCounts, elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    let rps = if secs > 0.0 {
        live.requests as f64 / secs
    } else {
        0.0
    };
    format!(
        "{:.0} req/s • {} failed • {} dropped",
        rps, live.failed, live.dropped
    )
}

/// Live progress bar fed from the collector's running totals.
pub struct ProgressMonitor {
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

impl ProgressMonitor {
    pub fn start(expected_ticks: u64, metrics: Arc<MetricsCollector>) -> Self {
        let stop = CancellationToken::new();
        let bar = create_progress_bar(expected_ticks);

        let handle = {
            let stop = stop.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(REFRESH_INTERVAL);
                loop {
                    tokio::select! {
                        _ = stop.cancelled() => break,
                        _ = interval.tick() => {
                            let live = metrics.live();
                            bar.set_position(live.iterations + live.dropped);
                            bar.set_message(progress_message(&live, bar.elapsed()));
                        }
                    }
                }
                let live = metrics.live();
                bar.set_position(live.iterations + live.dropped);
                bar.finish_and_clear();
            })
        };

        Self { stop, handle }
    }

    pub async fn finish(self) {
        self.stop.cancel();
        if let Err(err) = self.handle.await {
            tracing::debug!(error = %err, "progress task ended abnormally");
        }
    }
}
