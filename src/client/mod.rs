//! Client for the Ollama HTTP API.
//!
//! [`OllamaClient`] is the async client, [`BlockingOllamaClient`] its
//! blocking twin. Both share request builders, the retry policy, the status
//! table and the fallback rules; they differ only in how they wait.

mod blocking;
mod config;
mod embedding;
mod error;
mod fallback;
mod messages;
mod ollama;
mod progress;
mod request;
mod retry;
mod stream;
mod transport;

pub use blocking::{BlockingOllamaClient, BlockingTransport};
pub use config::{
    ClientConfig, DEFAULT_BACKOFF_BASE_MS, DEFAULT_BASE_URL, DEFAULT_MAX_RETRIES,
    DEFAULT_STREAM_TIMEOUT_SECS, DEFAULT_TIMEOUT_SECS,
};
pub use embedding::{cosine_similarity, extract_embedding, normalize_vector, top_k_similar};
pub use error::{ErrorKind, OllamaError, Result};
pub use fallback::{Fallback, FallbackDecision, FallbackState};
pub use messages::{ChatMessage, Role};
pub use ollama::{OllamaClient, LIVENESS_TIMEOUT};
pub use progress::{ProgressTracker, ProgressUpdate};
pub use request::{Endpoint, Request};
pub use retry::{backoff_delay, RetryState};
pub use stream::{RecordIter, RecordStream};
pub use transport::Transport;
