//! HTTP transport with retry.
//!
//! One `execute` call is one logical request: up to `max_retries + 1`
//! attempts with exponential backoff in between. Single-shot attempts carry a
//! total deadline; streaming attempts only an idle read timeout, so a
//! generation may run as long as the server keeps producing records. Only transport failures (timeouts, refused connections) are
//! retried. Any HTTP answer of 400 or above is final and mapped to an
//! [`OllamaError`] straight away.
//!
//! Dropping the future returned by `execute` aborts the in-flight attempt or
//! the pending backoff sleep.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, ClientBuilder, Response, StatusCode};
use serde_json::Value;
use tokio::time::sleep;
use uuid::Uuid;

use super::config::ClientConfig;
use super::error::{ErrorKind, OllamaError, Result};
use super::request::Request;
use super::retry::{AttemptFailure, RetryState};
use super::stream::{body_read_error, parse_json_body, RecordStream};

/// Async HTTP transport shared by all [`OllamaClient`](super::OllamaClient)
/// clones.
///
/// Single-shot and streaming requests use separate connection pools: the
/// streaming one carries an idle read timeout instead of a total deadline.
#[derive(Debug, Clone)]
pub struct Transport {
    http: Client,
    stream_http: Client,
    config: Arc<ClientConfig>,
}

fn client_builder(config: &ClientConfig) -> ClientBuilder {
    let builder = Client::builder()
        .user_agent(config.user_agent.clone())
        .connect_timeout(config.timeout);
    if config.use_system_proxy {
        builder
    } else {
        builder.no_proxy()
    }
}

fn build_error(err: reqwest::Error) -> OllamaError {
    OllamaError::new(ErrorKind::Config, format!("failed to build HTTP client: {err}"))
        .with_source(err)
}

impl Transport {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = client_builder(&config).build().map_err(build_error)?;
        let stream_http = client_builder(&config)
            .read_timeout(config.stream_timeout)
            .build()
            .map_err(build_error)?;

        Ok(Self {
            http,
            stream_http,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Execute a request with the configured retry policy.
    pub async fn execute(&self, request: &Request) -> Result<Response> {
        self.execute_with(request, RetryState::from_config(&self.config))
            .await
    }

    /// Execute a request with an explicit retry budget.
    pub async fn execute_with(&self, request: &Request, mut retry: RetryState) -> Result<Response> {
        let url = self.config.url_for(request.path);
        let deadline = self
            .config
            .attempt_timeout(request.wants_stream, request.timeout);
        let call_id = Uuid::new_v4();

        loop {
            let attempt = retry.begin_attempt();
            tracing::debug!(
                %call_id,
                method = %request.method,
                %url,
                attempt,
                max_attempts = retry.max_attempts(),
                stream = request.wants_stream,
                "sending request"
            );

            let failure = match self.send_once(&url, request, deadline).await {
                Ok(response) => return check_status(response).await,
                Err(e) => AttemptFailure::classify(e),
            };

            match retry.next_delay() {
                Some(delay) => {
                    tracing::debug!(
                        %call_id,
                        attempt,
                        failure = failure.label(),
                        delay_ms = delay.as_millis() as u64,
                        "attempt failed, backing off"
                    );
                    sleep(delay).await;
                }
                None => {
                    tracing::debug!(%call_id, attempts = retry.attempts(), "retries exhausted");
                    let timeout = self.config.reported_timeout(deadline);
                    return Err(failure.into_error(&url, retry.attempts(), timeout));
                }
            }
        }
    }

    async fn send_once(
        &self,
        url: &str,
        request: &Request,
        deadline: Option<Duration>,
    ) -> std::result::Result<Response, reqwest::Error> {
        let mut builder = if request.wants_stream {
            self.stream_http
                .request(request.method.clone(), url)
                .header(reqwest::header::ACCEPT, "application/x-ndjson")
        } else {
            self.http.request(request.method.clone(), url)
        };
        if let Some(deadline) = deadline {
            builder = builder.timeout(deadline);
        }
        if let Some(payload) = &request.payload {
            builder = builder.json(payload);
        }
        builder.send().await
    }

    /// Execute a single-shot request and decode its JSON body.
    pub async fn execute_json(&self, request: &Request) -> Result<Value> {
        let response = self.execute(request).await?;
        let body = response.text().await.map_err(body_read_error)?;
        parse_json_body(&body)
    }

    /// Execute a streaming request and decode its body as NDJSON records.
    pub async fn execute_stream(&self, request: &Request) -> Result<RecordStream> {
        let response = self.execute(request).await?;
        Ok(RecordStream::from_response(response))
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.as_u16() < StatusCode::BAD_REQUEST.as_u16() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let err = OllamaError::from_response(status.as_u16(), &body);
    tracing::debug!(status = status.as_u16(), kind = %err.kind(), "server returned error status");
    Err(err)
}
