// Copyright 2025 ModerRAS
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Ollama Forge
//!
//! Client for the [Ollama](https://ollama.com) local inference HTTP API.
//!
//! Requests are retried with exponential backoff on timeouts and refused
//! connections, HTTP error statuses map onto a small set of [`ErrorKind`]s,
//! streaming endpoints decode NDJSON lazily, and `chat`/`generate`/embedding
//! calls can substitute a fallback model once when the requested one is
//! missing or the server fails.
//!
//! ## Async Example
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use ollama_forge::{ChatMessage, ClientConfig, OllamaClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = OllamaClient::new(ClientConfig::default())?;
//!
//!     let reply = client
//!         .chat("llama3", &[ChatMessage::user("Why is the sky blue?")], None)
//!         .await?;
//!     println!("{}", reply["message"]["content"]);
//!
//!     let mut stream = client.generate_stream("llama3", "Count to five", None).await?;
//!     while let Some(record) = stream.next().await {
//!         print!("{}", record?["response"].as_str().unwrap_or_default());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Blocking Example
//!
//! ```rust,no_run
//! use ollama_forge::{BlockingOllamaClient, ClientConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let client = BlockingOllamaClient::new(ClientConfig::default())?;
//!     let vectors = client.embed_batch("nomic-embed-text", &["first", "second"], None);
//!     for (i, vector) in vectors.iter().enumerate() {
//!         match vector {
//!             Ok(v) => println!("{i}: {} dimensions", v.len()),
//!             Err(e) => println!("{i}: failed: {e}"),
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod settings;

#[cfg(test)]
mod test_support;

pub use client::{
    BlockingOllamaClient, ChatMessage, ClientConfig, ErrorKind, OllamaClient, OllamaError,
    ProgressTracker, ProgressUpdate, RecordIter, RecordStream, Result, Role,
};
pub use config::{recommend_model, ModelCatalog, OperationKind};
pub use settings::{ForgeSettings, SettingsError};
