use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Connect,
    Timeout,
    Request,
    Body,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Connect => "connect",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Request => "request",
            ErrorKind::Body => "body",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&reqwest::Error> for RequestError {
    fn from(err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ErrorKind::Timeout
        } else if err.is_connect() {
            ErrorKind::Connect
        } else if err.is_body() || err.is_decode() {
            ErrorKind::Body
        } else {
            ErrorKind::Request
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

/// The result of one request attempt. Immutable once built.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    timestamp: DateTime<Utc>,
    status: u16,
    latency: Duration,
    error: Option<RequestError>,
    bytes_sent: u64,
    bytes_received: u64,
}

impl RequestOutcome {
    pub fn response(status: u16, latency: Duration, bytes_sent: u64, bytes_received: u64) -> Self {
        Self {
            timestamp: Utc::now(),
            status,
            latency,
            error: None,
            bytes_sent,
            bytes_received,
        }
    }

    /// A response whose status arrived but whose body could not be read.
    pub fn partial(status: u16, latency: Duration, bytes_sent: u64, error: RequestError) -> Self {
        Self {
            timestamp: Utc::now(),
            status,
            latency,
            error: Some(error),
            bytes_sent,
            bytes_received: 0,
        }
    }

    pub fn transport_error(latency: Duration, bytes_sent: u64, error: RequestError) -> Self {
        Self {
            timestamp: Utc::now(),
            status: 0,
            latency,
            error: Some(error),
            bytes_sent,
            bytes_received: 0,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// 0 when no response was received.
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn latency(&self) -> Duration {
        self.latency
    }

    pub fn error(&self) -> Option<&RequestError> {
        self.error.as_ref()
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Counted by `http_req_failed`: any error, or a status outside 200..=399.
    pub fn is_failed(&self) -> bool {
        self.error.is_some() || !(200..400).contains(&self.status)
    }
}
