//! Blocking client example: streaming chat and model pull without an async runtime.

use ollama_forge::{BlockingOllamaClient, ChatMessage, ForgeSettings};
use std::io::Write;

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    // Settings file plus OLLAMA_FORGE_* overrides
    let settings = ForgeSettings::load();
    let client = BlockingOllamaClient::new(settings.client_config())?;
    let model = settings.chat_model.as_str();

    println!("⬇️  Making sure {model} is available...");
    let last = client.pull_model_with_progress(model, |update| {
        if update.status_changed {
            println!("   {}", update.status.as_deref().unwrap_or_default());
        }
    })?;
    println!("✅ {}\n", last["status"]);

    let messages = [ChatMessage::user("Explain NDJSON in two sentences.")];
    for record in client.chat_stream(model, &messages, None)? {
        let record = record?;
        print!("{}", record["message"]["content"].as_str().unwrap_or_default());
        std::io::stdout().flush()?;
        if record["done"].as_bool() == Some(true) {
            println!(
                "\n\n⏱️  {} tokens",
                record["eval_count"].as_u64().unwrap_or_default()
            );
        }
    }

    Ok(())
}
