//! Blocking client.
//!
//! Same operations, retry policy and fallback rules as the async
//! [`OllamaClient`](super::OllamaClient), on `reqwest::blocking`. Streaming
//! calls return a [`RecordIter`]. Do not use from inside an async runtime.

use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use reqwest::blocking::{Client, ClientBuilder, Response};
use reqwest::StatusCode;
use serde_json::Value;
use uuid::Uuid;

use super::config::ClientConfig;
use super::embedding::extract_embedding;
use super::error::{ErrorKind, OllamaError, Result};
use super::fallback::run_with_fallback_blocking;
use super::messages::ChatMessage;
use super::ollama::{stream_error, LIVENESS_TIMEOUT};
use super::progress::{ProgressTracker, ProgressUpdate};
use super::request::Request;
use super::retry::{AttemptFailure, RetryState};
use super::stream::{body_read_error, parse_json_body, RecordIter};
use crate::config::OperationKind;

/// Blocking counterpart of [`Transport`](super::Transport).
///
/// The streaming client's timeout bounds each read of the body, not the
/// whole response.
#[derive(Debug, Clone)]
pub struct BlockingTransport {
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

impl BlockingTransport {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = client_builder(&config).build().map_err(build_error)?;
        let stream_http = client_builder(&config)
            .timeout(config.stream_timeout)
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

    pub fn execute(&self, request: &Request) -> Result<Response> {
        self.execute_with(request, RetryState::from_config(&self.config))
    }

    pub fn execute_with(&self, request: &Request, mut retry: RetryState) -> Result<Response> {
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

            let failure = match self.send_once(&url, request, deadline) {
                Ok(response) => return check_status(response),
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
                    sleep(delay);
                }
                None => {
                    tracing::debug!(%call_id, attempts = retry.attempts(), "retries exhausted");
                    let timeout = self.config.reported_timeout(deadline);
                    return Err(failure.into_error(&url, retry.attempts(), timeout));
                }
            }
        }
    }

    fn send_once(
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
        builder.send()
    }

    pub fn execute_json(&self, request: &Request) -> Result<Value> {
        let response = self.execute(request)?;
        let body = response.text().map_err(body_read_error)?;
        parse_json_body(&body)
    }

    pub fn execute_stream(&self, request: &Request) -> Result<RecordIter> {
        let response = self.execute(request)?;
        Ok(RecordIter::from_response(response))
    }
}

fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.as_u16() < StatusCode::BAD_REQUEST.as_u16() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    let err = OllamaError::from_response(status.as_u16(), &body);
    tracing::debug!(status = status.as_u16(), kind = %err.kind(), "server returned error status");
    Err(err)
}

/// Blocking client for a local Ollama server.
#[derive(Debug, Clone)]
pub struct BlockingOllamaClient {
    transport: BlockingTransport,
}

impl BlockingOllamaClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        Ok(Self {
            transport: BlockingTransport::new(config)?,
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    pub fn config(&self) -> &ClientConfig {
        self.transport.config()
    }

    fn resolve(&self, model: &str) -> String {
        self.config().catalog.resolve(model)
    }

    pub fn version(&self) -> Result<Value> {
        self.transport.execute_json(&Request::version())
    }

    pub fn is_running(&self) -> bool {
        let request = Request::version().with_timeout(LIVENESS_TIMEOUT);
        match self
            .transport
            .execute_with(&request, RetryState::new(0, Duration::ZERO))
        {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = %e, "liveness probe failed");
                false
            }
        }
    }

    pub fn list_models(&self) -> Result<Value> {
        self.transport.execute_json(&Request::list_models())
    }

    pub fn generate(&self, model: &str, prompt: &str, options: Option<&Value>) -> Result<Value> {
        run_with_fallback_blocking(
            self.config(),
            self.resolve(model),
            OperationKind::Generate,
            |model| {
                self.transport
                    .execute_json(&Request::generate(&model, prompt, options, false))
                    .map_err(|e| e.with_model(model))
            },
        )
    }

    pub fn generate_stream(
        &self,
        model: &str,
        prompt: &str,
        options: Option<&Value>,
    ) -> Result<RecordIter> {
        run_with_fallback_blocking(
            self.config(),
            self.resolve(model),
            OperationKind::Generate,
            |model| {
                self.transport
                    .execute_stream(&Request::generate(&model, prompt, options, true))
                    .map_err(|e| e.with_model(model))
            },
        )
    }

    pub fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: Option<&Value>,
    ) -> Result<Value> {
        run_with_fallback_blocking(
            self.config(),
            self.resolve(model),
            OperationKind::Chat,
            |model| {
                self.transport
                    .execute_json(&Request::chat(&model, messages, options, false))
                    .map_err(|e| e.with_model(model))
            },
        )
    }

    pub fn chat_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: Option<&Value>,
    ) -> Result<RecordIter> {
        run_with_fallback_blocking(
            self.config(),
            self.resolve(model),
            OperationKind::Chat,
            |model| {
                self.transport
                    .execute_stream(&Request::chat(&model, messages, options, true))
                    .map_err(|e| e.with_model(model))
            },
        )
    }

    pub fn embed(&self, model: &str, input: &str, options: Option<&Value>) -> Result<Value> {
        run_with_fallback_blocking(
            self.config(),
            self.resolve(model),
            OperationKind::Embedding,
            |model| {
                self.transport
                    .execute_json(&Request::embed(&model, input, options))
                    .map_err(|e| e.with_model(model))
            },
        )
    }

    pub fn embedding(&self, model: &str, input: &str, options: Option<&Value>) -> Result<Vec<f64>> {
        let response = self.embed(model, input, options)?;
        extract_embedding(&response)
    }

    /// Embed each input in order, recording failures in place.
    pub fn embed_batch<S: AsRef<str>>(
        &self,
        model: &str,
        inputs: &[S],
        options: Option<&Value>,
    ) -> Vec<Result<Vec<f64>>> {
        inputs
            .iter()
            .enumerate()
            .map(|(index, input)| {
                let result = self.embedding(model, input.as_ref(), options);
                if let Err(e) = &result {
                    tracing::warn!(index, error = %e, "embedding failed, continuing batch");
                }
                result
            })
            .collect()
    }

    pub fn pull_model(&self, model: &str) -> Result<Value> {
        let model = self.resolve(model);
        self.transport
            .execute_json(&Request::pull(&model, false))
            .map_err(|e| e.with_model(model))
    }

    pub fn pull_model_stream(&self, model: &str) -> Result<RecordIter> {
        let model = self.resolve(model);
        self.transport
            .execute_stream(&Request::pull(&model, true))
            .map_err(|e| e.with_model(model))
    }

    pub fn pull_model_with_progress<F>(&self, model: &str, mut on_progress: F) -> Result<Value>
    where
        F: FnMut(&ProgressUpdate),
    {
        let model = self.resolve(model);
        let records = self
            .transport
            .execute_stream(&Request::pull(&model, true))
            .map_err(|e| e.with_model(model.as_str()))?;
        let mut tracker = ProgressTracker::new();
        let mut last = Value::Null;

        for record in records {
            let record = record.map_err(|e| e.with_model(model.as_str()))?;
            if let Some(message) = stream_error(&record) {
                return Err(OllamaError::new(ErrorKind::Api, message).with_model(model));
            }
            on_progress(&tracker.observe(&record));
            last = record;
        }

        tracing::info!(model = %model, bytes = tracker.transferred(), "pull finished");
        Ok(last)
    }

    pub fn push_model(&self, model: &str) -> Result<Value> {
        let model = self.resolve(model);
        self.transport
            .execute_json(&Request::push(&model, false))
            .map_err(|e| e.with_model(model))
    }

    pub fn push_model_stream(&self, model: &str) -> Result<RecordIter> {
        let model = self.resolve(model);
        self.transport
            .execute_stream(&Request::push(&model, true))
            .map_err(|e| e.with_model(model))
    }

    pub fn delete_model(&self, model: &str) -> Result<()> {
        let model = self.resolve(model);
        self.transport
            .execute_json(&Request::delete(&model))
            .map(|_| ())
            .map_err(|e| e.with_model(model))
    }

    pub fn copy_model(&self, source: &str, destination: &str) -> Result<Value> {
        let source = self.resolve(source);
        self.transport
            .execute_json(&Request::copy(&source, destination))
            .map_err(|e| e.with_model(source))
    }

    pub fn create_model(&self, name: &str, modelfile: &str) -> Result<Value> {
        self.transport
            .execute_json(&Request::create(name, modelfile, false))
            .map_err(|e| e.with_model(name))
    }

    pub fn create_model_stream(&self, name: &str, modelfile: &str) -> Result<RecordIter> {
        self.transport
            .execute_stream(&Request::create(name, modelfile, true))
            .map_err(|e| e.with_model(name))
    }
}
