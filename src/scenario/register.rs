use crate::engine::context::IterationContext;
use crate::metrics::outcome::{RequestError, RequestOutcome};
use crate::scenario::payload::CredentialGenerator;
use crate::scenario::Scenario;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use std::time::Instant;
use url::Url;

pub const REGISTER_PATH: &str = "/auth/register";
pub const STATUS_CHECK: &str = "status is 200";

/// `POST /auth/register` with fresh credentials every iteration.
pub struct RegisterScenario {
    client: Client,
    endpoint: Url,
    credentials: CredentialGenerator,
}

impl RegisterScenario {
    pub fn new(client: Client, endpoint: Url) -> Self {
        Self::with_credentials(client, endpoint, CredentialGenerator::new())
    }

    pub fn with_credentials(client: Client, endpoint: Url, credentials: CredentialGenerator) -> Self {
        Self {
            client,
            endpoint,
            credentials,
        }
    }

    async fn register(&self, ctx: IterationContext) {
        let payload = self.credentials.payload(ctx.iteration());
        let body = match serde_json::to_vec(&payload) {
            Ok(body) => body,
            Err(err) => {
                tracing::error!(error = %err, "failed to encode registration payload");
                return;
            }
        };
        let bytes_sent = body.len() as u64;

        let request = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body);

        let started = Instant::now();
        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            Ok::<_, reqwest::Error>((status, response.bytes().await))
        };

        let result = exchange.await;
        let latency = started.elapsed();

        let outcome = match result {
            Ok((status, Ok(bytes))) => {
                RequestOutcome::response(status.as_u16(), latency, bytes_sent, bytes.len() as u64)
            }
            Ok((status, Err(err))) => {
                tracing::debug!(iteration = ctx.iteration(), error = %err, "failed to read response body");
                RequestOutcome::partial(status.as_u16(), latency, bytes_sent, RequestError::from(&err))
            }
            Err(err) => {
                tracing::debug!(iteration = ctx.iteration(), error = %err, "request failed");
                RequestOutcome::transport_error(latency, bytes_sent, RequestError::from(&err))
            }
        };

        ctx.check(STATUS_CHECK, outcome.status() == StatusCode::OK.as_u16());
        ctx.record_request(outcome);
    }
}

impl Scenario for RegisterScenario {
    fn name(&self) -> &str {
        "register"
    }

    fn run(&self, ctx: IterationContext) -> BoxFuture<'_, ()> {
        self.register(ctx).boxed()
    }
}
