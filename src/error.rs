use std::path::PathBuf;
use thiserror::Error;

/// Everything that can stop a run before the first tick is scheduled.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("environment variable '{0}' is not set and has no default")]
    MissingEnv(String),

    #[error("invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("unknown metric '{0}' in thresholds")]
    UnknownMetric(String),

    #[error("invalid threshold '{expression}' on '{metric}': {reason}")]
    Threshold {
        metric: String,
        expression: String,
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
