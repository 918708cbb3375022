//! Raw per-request export, one CSV row per recorded request.

use crate::metrics::outcome::RequestOutcome;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::path::Path;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub type SampleSink = mpsc::UnboundedSender<Sample>;

#[derive(Debug, Clone, Serialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub status: u16,
    pub duration_ms: f64,
    pub failed: bool,
    pub error: Option<String>,
}

impl Sample {
    pub fn from_outcome(outcome: &RequestOutcome) -> Self {
        Self {
            timestamp: outcome.timestamp(),
            status: outcome.status(),
            duration_ms: outcome.latency().as_micros() as f64 / 1000.0,
            failed: outcome.is_failed(),
            error: outcome
                .error()
                .map(|e| format!("{}: {}", e.kind, e.message)),
        }
    }
}

/// Background CSV writer fed through a [`SampleSink`].
///
/// The file is finished once every sink clone has been dropped and
/// [`CsvSampleWriter::finish`] has been awaited.
pub struct CsvSampleWriter {
    handle: JoinHandle<Result<u64>>,
}

impl CsvSampleWriter {
    pub fn create(path: &Path) -> Result<(SampleSink, Self)> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create sample file {}", path.display()))?;
        let mut writer = csv::Writer::from_writer(file);
        let (tx, mut rx) = mpsc::unbounded_channel::<Sample>();

        let handle = tokio::task::spawn_blocking(move || -> Result<u64> {
            let mut rows = 0u64;
            while let Some(sample) = rx.blocking_recv() {
                writer.serialize(&sample)?;
                rows += 1;
            }
            writer.flush()?;
            Ok(rows)
        });

        Ok((tx, Self { handle }))
    }

    /// Waits for the writer to drain and returns the number of rows written.
    pub async fn finish(self) -> Result<u64> {
        self.handle.await.context("Sample writer task failed")?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::outcome::{ErrorKind, RequestError};
    use std::time::Duration;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_writes_one_row_per_sample() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("samples.csv");
        let (sink, writer) = CsvSampleWriter::create(&path)?;

        let ok = RequestOutcome::response(200, Duration::from_millis(12), 80, 20);
        let refused = RequestOutcome::transport_error(
            Duration::from_millis(1),
            80,
            RequestError {
                kind: ErrorKind::Connect,
                message: "connection refused".to_string(),
            },
        );
        sink.send(Sample::from_outcome(&ok))?;
        sink.send(Sample::from_outcome(&refused))?;
        drop(sink);

        assert_eq!(writer.finish().await?, 2);

        let content = std::fs::read_to_string(&path)?;
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "timestamp,status,duration_ms,failed,error");
        assert!(lines[1].contains(",200,12.0,false,"));
        assert!(lines[2].contains(",0,1.0,true,connect: connection refused"));
        Ok(())
    }
}
