use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use voxtext_core::config::Config;
use voxtext_core::engine::Engine;
use voxtext_core::models::ModelSize;
use voxtext_server::router::create_router;
use voxtext_server::state::AppState;

/// Application-specific environment variable for log filtering (overrides config).
const LOG_ENV_VAR: &str = "VOXTEXT_LOG";

#[derive(Parser)]
#[command(name = "voxtextd")]
#[command(about = "voxtext transcription server")]
#[command(version)]
struct Args {
    /// Model size to load.
    #[arg(long)]
    model: Option<ModelSize>,
    /// Address to listen on.
    #[arg(long)]
    host: Option<String>,
    /// Port to listen on.
    #[arg(long)]
    port: Option<u16>,
    /// Skip accelerator probing and load on CPU.
    #[arg(long)]
    cpu: bool,
    /// Default language code (auto-detect when omitted).
    #[arg(long)]
    language: Option<String>,
    /// Config file path (defaults to ~/.config/voxtext/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path).context("failed to load config")?,
        None => Config::load().unwrap_or_default(),
    };
    if let Some(model) = args.model {
        config.model.size = model;
    }
    if args.cpu {
        config.model.prefer_gpu = false;
    }
    if args.language.is_some() {
        config.model.language = args.language.clone();
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    // VOXTEXT_LOG env var overrides the config file level
    let filter = EnvFilter::builder()
        .with_env_var(LOG_ENV_VAR)
        .with_default_directive(config.logging.level.as_directive().parse()?)
        .from_env()?;

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    voxtext_core::install_inference_logging();

    tracing::info!(model = %config.model.size, "loading model");
    let engine_config = config.clone();
    let engine = tokio::task::spawn_blocking(move || Engine::new(&engine_config))
        .await?
        .context("failed to initialize transcription engine")?;

    let status = engine.status();
    tracing::info!(
        model = %status.model_size,
        device = %status.device,
        precision = %status.precision,
        "engine ready"
    );

    let router = create_router(AppState::new(engine));
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(addr = %addr, "server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
