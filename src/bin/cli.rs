//! Ollama Forge - command-line client for a local Ollama server
//!
//! Run with: cargo run --bin ollama-forge -- <command> [args]

use futures::StreamExt;
use ollama_forge::client::cosine_similarity;
use ollama_forge::{ChatMessage, ForgeSettings, OllamaClient};
use std::env;
use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "\
Usage: ollama-forge <command> [args]

Commands:
  version                      Show the server version
  list                         List local models
  generate [model] <prompt>    Stream a completion (model defaults to the chat model)
  chat [model]                 Interactive streaming chat
  embed [model] <text>         Print the embedding size and a preview
  similarity <a> <b>           Cosine similarity of two texts
  pull <model>                 Pull a model, showing progress
  delete <model>               Delete a local model
  copy <source> <destination>  Copy a model

Environment:
  OLLAMA_FORGE_BASE_URL, OLLAMA_FORGE_TIMEOUT, OLLAMA_FORGE_STREAM_TIMEOUT,
  OLLAMA_FORGE_MAX_RETRIES, OLLAMA_FORGE_BACKOFF_BASE, OLLAMA_FORGE_DEBUG,
  OLLAMA_FORGE_CHAT_MODEL, OLLAMA_FORGE_EMBEDDING_MODEL";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    let settings = ForgeSettings::load();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.log_filter())),
        )
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        println!("{USAGE}");
        return Ok(());
    };
    let rest = &args[1..];

    let client = OllamaClient::new(settings.client_config())?;

    match command.as_str() {
        "version" => {
            let version = client.version().await?;
            println!("Ollama {}", version["version"].as_str().unwrap_or("unknown"));
        }
        "list" => list_models(&client).await?,
        "generate" => {
            let (model, prompt) = model_and_text(rest, &settings.chat_model)?;
            generate(&client, &model, &prompt).await?;
        }
        "chat" => {
            let model = rest.first().cloned().unwrap_or(settings.chat_model.clone());
            chat(&client, &model).await?;
        }
        "embed" => {
            let (model, text) = model_and_text(rest, &settings.embedding_model)?;
            let vector = client.embedding(&model, &text, None).await?;
            let preview: Vec<String> = vector.iter().take(5).map(|v| format!("{v:.4}")).collect();
            println!("🔢 {} dimensions: [{}, ...]", vector.len(), preview.join(", "));
        }
        "similarity" => {
            let [a, b] = rest else {
                anyhow::bail!("similarity needs exactly two texts");
            };
            let vectors = client
                .embed_batch(&settings.embedding_model, &[a, b], None)
                .await
                .into_iter()
                .collect::<Result<Vec<_>, _>>()?;
            match cosine_similarity(&vectors[0], &vectors[1]) {
                Some(score) => println!("📐 Similarity: {score:.4}"),
                None => println!("⚠️  Embeddings have mismatched dimensions"),
            }
        }
        "pull" => {
            let model = required(rest, 0, "model")?;
            pull(&client, model).await?;
        }
        "delete" => {
            let model = required(rest, 0, "model")?;
            client.delete_model(model).await?;
            println!("🗑️  Deleted {model}");
        }
        "copy" => {
            let source = required(rest, 0, "source")?;
            let destination = required(rest, 1, "destination")?;
            client.copy_model(source, destination).await?;
            println!("📋 Copied {source} -> {destination}");
        }
        "help" | "--help" | "-h" => println!("{USAGE}"),
        other => {
            eprintln!("Unknown command: {other}\n");
            println!("{USAGE}");
        }
    }

    Ok(())
}

fn required<'a>(args: &'a [String], index: usize, name: &str) -> anyhow::Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| anyhow::anyhow!("missing <{name}> argument"))
}

/// `[model] <text...>`: a single argument is the text.
fn model_and_text(args: &[String], default_model: &str) -> anyhow::Result<(String, String)> {
    match args {
        [] => anyhow::bail!("missing text argument"),
        [text] => Ok((default_model.to_string(), text.clone())),
        [model, text @ ..] => Ok((model.clone(), text.join(" "))),
    }
}

async fn list_models(client: &OllamaClient) -> anyhow::Result<()> {
    let listing = client.list_models().await?;
    let models = listing["models"].as_array().cloned().unwrap_or_default();
    if models.is_empty() {
        println!("No local models. Try: ollama-forge pull <model>");
        return Ok(());
    }
    for model in models {
        let size_gb = model["size"].as_f64().unwrap_or(0.0) / 1e9;
        println!(
            "📦 {:<40} {:>6.2} GB",
            model["name"].as_str().unwrap_or("?"),
            size_gb
        );
    }
    Ok(())
}

async fn generate(client: &OllamaClient, model: &str, prompt: &str) -> anyhow::Result<()> {
    let mut stream = client.generate_stream(model, prompt, None).await?;
    while let Some(record) = stream.next().await {
        let record = record?;
        print!("{}", record["response"].as_str().unwrap_or_default());
        io::stdout().flush()?;
    }
    println!();
    Ok(())
}

async fn chat(client: &OllamaClient, model: &str) -> anyhow::Result<()> {
    println!("💬 Chatting with {model}. Type 'quit' or 'exit' to exit.\n");

    let mut history: Vec<ChatMessage> = Vec::new();
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "quit" || input == "exit" {
            println!("Goodbye! 👋");
            break;
        }

        history.push(ChatMessage::user(input));
        let mut stream = match client.chat_stream(model, &history, None).await {
            Ok(stream) => stream,
            Err(e) => {
                eprintln!("❌ Error: {e}\n");
                history.pop();
                continue;
            }
        };

        let mut reply = String::new();
        while let Some(record) = stream.next().await {
            match record {
                Ok(record) => {
                    let piece = record["message"]["content"].as_str().unwrap_or_default();
                    print!("{piece}");
                    io::stdout().flush()?;
                    reply.push_str(piece);
                }
                Err(e) => {
                    eprintln!("\n❌ Stream error: {e}");
                    break;
                }
            }
        }
        println!("\n");
        history.push(ChatMessage::assistant(reply));
    }

    Ok(())
}

async fn pull(client: &OllamaClient, model: &str) -> anyhow::Result<()> {
    println!("⬇️  Pulling {model}");
    let last = client
        .pull_model_with_progress(model, |update| {
            if update.status_changed {
                tracing::info!(status = update.status.as_deref().unwrap_or_default(), "pull status");
            }
            if let Some(fraction) = update.fraction() {
                print!("\r   {:>5.1}%", fraction * 100.0);
                let _ = io::stdout().flush();
            }
        })
        .await?;
    println!("\n✅ {}", last["status"].as_str().unwrap_or("done"));
    Ok(())
}
