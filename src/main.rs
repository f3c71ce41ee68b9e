use anyhow::Result;
use tracing_subscriber::EnvFilter;

use ollama_chat::{run_server, AppConfig};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::from_env();
    tokio::fs::create_dir_all(&config.data_dir).await?;

    tracing::info!(
        ollama = %config.ollama_base_url,
        uploads = %config.upload_dir.display(),
        "starting chat front end"
    );

    run_server(config).await
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
