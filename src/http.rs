use crate::config::RunConfig;
use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;

const USER_AGENT: &str = concat!("stampede/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client for every VU. Connections are pooled per host, so the
/// idle pool is sized to the most VUs that can be in flight at once.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(timeout: Duration, insecure: bool, max_idle_per_host: usize) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .tcp_nodelay(true)
            .pool_max_idle_per_host(max_idle_per_host);

        if insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Self {
            client: builder.build().context("Failed to build HTTP client")?,
        })
    }

    pub fn from_config(config: &RunConfig) -> Result<Self> {
        Self::new(
            config.request_timeout,
            config.insecure,
            config.scenario.max_vus as usize,
        )
    }

    pub fn into_inner(self) -> Client {
        self.client
    }
}
