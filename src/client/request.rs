//! Request descriptions for every server endpoint.
//!
//! Builders here are pure: they turn typed arguments into a [`Request`]
//! without touching the network, so the async and blocking clients share
//! them. Model names passed in are expected to be alias-resolved already.

use reqwest::Method;
use serde_json::{json, Map, Value};
use std::time::Duration;

use super::messages::ChatMessage;

/// Server API endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Version,
    Generate,
    Chat,
    Embed,
    Tags,
    Pull,
    Push,
    Delete,
    Copy,
    Create,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Version => "/api/version",
            Endpoint::Generate => "/api/generate",
            Endpoint::Chat => "/api/chat",
            Endpoint::Embed => "/api/embed",
            Endpoint::Tags => "/api/tags",
            Endpoint::Pull => "/api/pull",
            Endpoint::Push => "/api/push",
            Endpoint::Delete => "/api/delete",
            Endpoint::Copy => "/api/copy",
            Endpoint::Create => "/api/create",
        }
    }

    pub fn method(&self) -> Method {
        match self {
            Endpoint::Version | Endpoint::Tags => Method::GET,
            Endpoint::Delete => Method::DELETE,
            _ => Method::POST,
        }
    }
}

/// Payload keys owned by the builders; caller options never replace them.
const RESERVED_KEYS: &[&str] = &["model", "prompt", "messages", "stream", "input"];

/// One HTTP request to execute.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: &'static str,
    pub payload: Option<Value>,
    pub wants_stream: bool,
    /// Total deadline for each attempt; `None` uses the client's default.
    pub timeout: Option<Duration>,
}

impl Request {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            method: endpoint.method(),
            path: endpoint.path(),
            payload: None,
            wants_stream: false,
            timeout: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn streaming(mut self, wants_stream: bool) -> Self {
        self.wants_stream = wants_stream;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn version() -> Self {
        Self::new(Endpoint::Version)
    }

    pub fn list_models() -> Self {
        Self::new(Endpoint::Tags)
    }

    pub fn generate(model: &str, prompt: &str, options: Option<&Value>, stream: bool) -> Self {
        let mut body = json!({
            "model": model,
            "prompt": prompt,
            "stream": stream,
        });
        merge_options(&mut body, options);
        Self::new(Endpoint::Generate)
            .with_payload(body)
            .streaming(stream)
    }

    pub fn chat(
        model: &str,
        messages: &[ChatMessage],
        options: Option<&Value>,
        stream: bool,
    ) -> Self {
        let mut body = json!({
            "model": model,
            "messages": messages,
            "stream": stream,
        });
        merge_options(&mut body, options);
        Self::new(Endpoint::Chat).with_payload(body).streaming(stream)
    }

    pub fn embed(model: &str, input: &str, options: Option<&Value>) -> Self {
        let mut body = json!({
            "model": model,
            "input": input,
        });
        merge_options(&mut body, options);
        Self::new(Endpoint::Embed).with_payload(body)
    }

    pub fn pull(model: &str, stream: bool) -> Self {
        Self::new(Endpoint::Pull)
            .with_payload(json!({ "name": model, "stream": stream }))
            .streaming(stream)
    }

    pub fn push(model: &str, stream: bool) -> Self {
        Self::new(Endpoint::Push)
            .with_payload(json!({ "name": model, "stream": stream }))
            .streaming(stream)
    }

    pub fn delete(model: &str) -> Self {
        Self::new(Endpoint::Delete).with_payload(json!({ "model": model }))
    }

    pub fn copy(source: &str, destination: &str) -> Self {
        Self::new(Endpoint::Copy).with_payload(json!({
            "source": source,
            "destination": destination,
        }))
    }

    pub fn create(name: &str, modelfile: &str, stream: bool) -> Self {
        Self::new(Endpoint::Create)
            .with_payload(json!({
                "name": name,
                "modelfile": modelfile,
                "stream": stream,
            }))
            .streaming(stream)
    }
}

/// Merge caller options into the payload as top-level keys.
fn merge_options(body: &mut Value, options: Option<&Value>) {
    let (Value::Object(map), Some(Value::Object(extra))) = (body, options) else {
        return;
    };
    merge_map(map, extra);
}

fn merge_map(map: &mut Map<String, Value>, extra: &Map<String, Value>) {
    for (key, value) in extra {
        if RESERVED_KEYS.contains(&key.as_str()) {
            continue;
        }
        map.insert(key.clone(), value.clone());
    }
}
