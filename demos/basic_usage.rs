//! Basic usage example for Ollama Forge.

use futures::StreamExt;
use ollama_forge::client::top_k_similar;
use ollama_forge::{recommend_model, ChatMessage, ClientConfig, OllamaClient};
use std::io::Write;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing for debug output
    tracing_subscriber::fmt::init();

    // Configure the client
    // You can customize these settings based on your setup
    let config = ClientConfig::default()
        .with_base_url("http://localhost:11434")
        .with_max_retries(2)
        .with_backoff_base(Duration::from_millis(250))
        .with_alias("fast", "qwen2.5:0.5b-instruct");

    let client = OllamaClient::new(config)?;

    if !client.is_running().await {
        eprintln!("❌ No Ollama server at http://localhost:11434");
        return Ok(());
    }

    let version = client.version().await?;
    println!("🤖 Ollama {}\n", version["version"]);

    // Single-shot chat, falls back to a related model if "fast" is missing
    let messages = [
        ChatMessage::system("Answer in one sentence."),
        ChatMessage::user("What is a large language model?"),
    ];
    match client.chat("fast", &messages, None).await {
        Ok(reply) => println!("💬 {}\n", reply["message"]["content"]),
        Err(e) => eprintln!("❌ Chat failed: {e}\n"),
    }

    // Streaming generation
    let model = recommend_model("completion", "small");
    println!("📝 Streaming from {model}:");
    let mut stream = client
        .generate_stream(model, "Write a haiku about rust.", None)
        .await?;
    while let Some(record) = stream.next().await {
        print!("{}", record?["response"].as_str().unwrap_or_default());
        std::io::stdout().flush()?;
    }
    println!("\n");

    // Semantic search over a few documents
    let documents = [
        "The cat sat on the mat.",
        "Rust guarantees memory safety without a garbage collector.",
        "Tokio is an asynchronous runtime for Rust.",
    ];
    let vectors: Vec<Vec<f64>> = client
        .embed_batch("embedding", &documents, None)
        .await
        .into_iter()
        .filter_map(Result::ok)
        .collect();
    if vectors.len() == documents.len() {
        let query = client
            .embedding("embedding", "async programming in rust", None)
            .await?;
        for (index, score) in top_k_similar(&query, &vectors, 2) {
            println!("🔎 {score:.3}  {}", documents[index]);
        }
    }

    Ok(())
}
