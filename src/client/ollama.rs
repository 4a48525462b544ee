//! Async client for the Ollama HTTP API.

use std::time::Duration;

use futures::StreamExt;
use serde_json::Value;

use super::config::ClientConfig;
use super::embedding::extract_embedding;
use super::error::{ErrorKind, OllamaError, Result};
use super::fallback::run_with_fallback;
use super::messages::ChatMessage;
use super::progress::{ProgressTracker, ProgressUpdate};
use super::request::Request;
use super::retry::RetryState;
use super::stream::RecordStream;
use super::transport::Transport;
use crate::config::OperationKind;

/// Timeout of the [`OllamaClient::is_running`] probe.
pub const LIVENESS_TIMEOUT: Duration = Duration::from_secs(2);

/// Client for a local Ollama server.
///
/// Cheap to clone; clones share the connection pool and configuration.
/// Every model argument is alias-resolved once at the start of the call.
/// `chat`, `generate` and the embedding calls substitute a fallback model at
/// most once when the primary model is missing or the server fails.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    transport: Transport,
}

impl OllamaClient {
    /// Create a new OllamaClient with the given configuration.
    pub fn new(config: ClientConfig) -> Result<Self> {
        Ok(Self {
            transport: Transport::new(config)?,
        })
    }

    /// Create a new OllamaClient with default configuration.
    pub fn with_defaults() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    pub fn config(&self) -> &ClientConfig {
        self.transport.config()
    }

    fn resolve(&self, model: &str) -> String {
        self.config().catalog.resolve(model)
    }

    /// Server version information.
    pub async fn version(&self) -> Result<Value> {
        self.transport.execute_json(&Request::version()).await
    }

    /// Whether the server answers at all. Never retries, never fails.
    pub async fn is_running(&self) -> bool {
        let request = Request::version().with_timeout(LIVENESS_TIMEOUT);
        match self
            .transport
            .execute_with(&request, RetryState::new(0, Duration::ZERO))
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = %e, "liveness probe failed");
                false
            }
        }
    }

    /// Locally available models.
    pub async fn list_models(&self) -> Result<Value> {
        self.transport.execute_json(&Request::list_models()).await
    }

    /// Generate a completion for `prompt`.
    pub async fn generate(&self, model: &str, prompt: &str, options: Option<&Value>) -> Result<Value> {
        let transport = &self.transport;
        run_with_fallback(
            self.config(),
            self.resolve(model),
            OperationKind::Generate,
            |model| async move {
                let request = Request::generate(&model, prompt, options, false);
                transport
                    .execute_json(&request)
                    .await
                    .map_err(|e| e.with_model(model))
            },
        )
        .await
    }

    /// Stream a completion for `prompt` as NDJSON records.
    ///
    /// Fallback applies while opening the stream; once records flow, errors
    /// surface through the stream itself.
    pub async fn generate_stream(
        &self,
        model: &str,
        prompt: &str,
        options: Option<&Value>,
    ) -> Result<RecordStream> {
        let transport = &self.transport;
        run_with_fallback(
            self.config(),
            self.resolve(model),
            OperationKind::Generate,
            |model| async move {
                let request = Request::generate(&model, prompt, options, true);
                transport
                    .execute_stream(&request)
                    .await
                    .map_err(|e| e.with_model(model))
            },
        )
        .await
    }

    /// Send a chat conversation and wait for the full reply.
    pub async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: Option<&Value>,
    ) -> Result<Value> {
        let transport = &self.transport;
        run_with_fallback(
            self.config(),
            self.resolve(model),
            OperationKind::Chat,
            |model| async move {
                let request = Request::chat(&model, messages, options, false);
                transport
                    .execute_json(&request)
                    .await
                    .map_err(|e| e.with_model(model))
            },
        )
        .await
    }

    /// Send a chat conversation and stream the reply.
    pub async fn chat_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: Option<&Value>,
    ) -> Result<RecordStream> {
        let transport = &self.transport;
        run_with_fallback(
            self.config(),
            self.resolve(model),
            OperationKind::Chat,
            |model| async move {
                let request = Request::chat(&model, messages, options, true);
                transport
                    .execute_stream(&request)
                    .await
                    .map_err(|e| e.with_model(model))
            },
        )
        .await
    }

    /// Raw embed response for `input`.
    pub async fn embed(&self, model: &str, input: &str, options: Option<&Value>) -> Result<Value> {
        let transport = &self.transport;
        run_with_fallback(
            self.config(),
            self.resolve(model),
            OperationKind::Embedding,
            |model| async move {
                let request = Request::embed(&model, input, options);
                transport
                    .execute_json(&request)
                    .await
                    .map_err(|e| e.with_model(model))
            },
        )
        .await
    }

    /// Embedding vector for `input`.
    pub async fn embedding(
        &self,
        model: &str,
        input: &str,
        options: Option<&Value>,
    ) -> Result<Vec<f64>> {
        let response = self.embed(model, input, options).await?;
        extract_embedding(&response)
    }

    /// Embed each input in order.
    ///
    /// A failing input does not abort the batch: its slot holds the error and
    /// the remaining inputs are still embedded.
    pub async fn embed_batch<S: AsRef<str>>(
        &self,
        model: &str,
        inputs: &[S],
        options: Option<&Value>,
    ) -> Vec<Result<Vec<f64>>> {
        let mut results = Vec::with_capacity(inputs.len());
        for (index, input) in inputs.iter().enumerate() {
            let result = self.embedding(model, input.as_ref(), options).await;
            if let Err(e) = &result {
                tracing::warn!(index, error = %e, "embedding failed, continuing batch");
            }
            results.push(result);
        }
        results
    }

    /// Pull a model and wait for the final status record.
    pub async fn pull_model(&self, model: &str) -> Result<Value> {
        let model = self.resolve(model);
        self.transport
            .execute_json(&Request::pull(&model, false))
            .await
            .map_err(|e| e.with_model(model))
    }

    /// Pull a model, streaming progress records.
    pub async fn pull_model_stream(&self, model: &str) -> Result<RecordStream> {
        let model = self.resolve(model);
        self.transport
            .execute_stream(&Request::pull(&model, true))
            .await
            .map_err(|e| e.with_model(model))
    }

    /// Pull a model, reporting forward-only progress to `on_progress`.
    ///
    /// Returns the last record. An `error` record from the server ends the
    /// pull with an `Api` error.
    pub async fn pull_model_with_progress<F>(&self, model: &str, mut on_progress: F) -> Result<Value>
    where
        F: FnMut(&ProgressUpdate),
    {
        let model = self.resolve(model);
        let mut stream = self
            .transport
            .execute_stream(&Request::pull(&model, true))
            .await
            .map_err(|e| e.with_model(model.as_str()))?;
        let mut tracker = ProgressTracker::new();
        let mut last = Value::Null;

        while let Some(record) = stream.next().await {
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

    /// Push a model and wait for the final status record.
    pub async fn push_model(&self, model: &str) -> Result<Value> {
        let model = self.resolve(model);
        self.transport
            .execute_json(&Request::push(&model, false))
            .await
            .map_err(|e| e.with_model(model))
    }

    /// Push a model, streaming progress records.
    pub async fn push_model_stream(&self, model: &str) -> Result<RecordStream> {
        let model = self.resolve(model);
        self.transport
            .execute_stream(&Request::push(&model, true))
            .await
            .map_err(|e| e.with_model(model))
    }

    pub async fn delete_model(&self, model: &str) -> Result<()> {
        let model = self.resolve(model);
        self.transport
            .execute_json(&Request::delete(&model))
            .await
            .map(|_| ())
            .map_err(|e| e.with_model(model))
    }

    /// Copy `source` to `destination`. Only `source` is alias-resolved.
    pub async fn copy_model(&self, source: &str, destination: &str) -> Result<Value> {
        let source = self.resolve(source);
        self.transport
            .execute_json(&Request::copy(&source, destination))
            .await
            .map_err(|e| e.with_model(source))
    }

    /// Create a model named `name` from a Modelfile.
    pub async fn create_model(&self, name: &str, modelfile: &str) -> Result<Value> {
        self.transport
            .execute_json(&Request::create(name, modelfile, false))
            .await
            .map_err(|e| e.with_model(name))
    }

    pub async fn create_model_stream(&self, name: &str, modelfile: &str) -> Result<RecordStream> {
        self.transport
            .execute_stream(&Request::create(name, modelfile, true))
            .await
            .map_err(|e| e.with_model(name))
    }
}

/// Error message carried by an in-stream `{"error": ...}` record.
pub(crate) fn stream_error(record: &Value) -> Option<String> {
    match record.get("error")? {
        Value::String(message) => Some(message.clone()),
        other => Some(other.to_string()),
    }
}
