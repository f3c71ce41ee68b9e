use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ollama_chat::config::AppConfig;
use ollama_chat::extract::speech::SpeechClient;
use ollama_chat::extract::DocumentExtractor;

#[derive(Parser, Debug)]
#[command(name = "extract")]
#[command(about = "Print the chat-context text extracted from documents")]
struct Cli {
    #[arg(required = true)]
    files: Vec<PathBuf>,
    /// Override MAX_EXTRACT_CHARS for this run.
    #[arg(long)]
    max_chars: Option<usize>,
    /// Emit one JSON object per file instead of plain text.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = AppConfig::from_env();
    let mut extract_config = config.extract.clone();
    if let Some(max_chars) = cli.max_chars {
        extract_config.max_chars = max_chars;
    }
    let extractor = DocumentExtractor::new(extract_config, SpeechClient::new(config.speech));

    for file in &cli.files {
        let content = extractor.extract(file).await;
        if cli.json {
            let line = serde_json::json!({
                "file": file.display().to_string(),
                "chars": content.chars().count(),
                "content": content,
            });
            println!("{}", serde_json::to_string(&line)?);
        } else {
            println!("==> {} <==", file.display());
            println!("{content}");
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
