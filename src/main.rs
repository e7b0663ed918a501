use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use loqa_chat::chat::MODEL_CATALOG;
use loqa_chat::recording::format_duration;
use loqa_chat::{
    create_router, AppState, AudioNormalizer, CaptureDeviceFactory, CaptureSource, ChatSession,
    Config, NatsInferenceEngine, Recorder, RecorderEvent,
};
use tower_http::services::ServeDir;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "loqa-chat", version, about = "Chat with on-device language models")]
struct Cli {
    /// Config file, with or without extension
    #[arg(long, default_value = "config/loqa-chat")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API
    Serve,

    /// Convert an audio file to 16kHz mono float WAV
    Normalize { input: PathBuf, output: PathBuf },

    /// Record from an audio file standing in for a microphone
    Record {
        #[arg(long)]
        source: PathBuf,

        #[arg(long, default_value_t = 5)]
        seconds: u64,

        #[arg(long)]
        out: PathBuf,
    },

    /// List built-in models
    Models,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    match cli.command {
        Command::Serve => serve(cfg).await,
        Command::Normalize { input, output } => normalize(&input, &output),
        Command::Record { source, seconds, out } => record(source, seconds, &out).await,
        Command::Models => {
            for option in MODEL_CATALOG {
                println!(
                    "{:<12} {:<14} {:>7}  multimodal={}  {}",
                    option.id, option.name, option.size, option.supports_multimodal, option.description
                );
            }
            Ok(())
        }
    }
}

async fn serve(cfg: Config) -> Result<()> {
    info!("Loqa Chat v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    let engine =
        NatsInferenceEngine::connect(&cfg.engine.nats_url, cfg.engine.request_timeout()).await?;
    let chat = Arc::new(ChatSession::new(Arc::new(engine), cfg.chat.clone()));

    if let Some(model) = cfg.model.clone() {
        if let Err(e) = chat.load_model(model).await {
            warn!("Startup model load failed, continuing without a model: {}", e);
        }
    }

    let mut app = create_router(AppState::new(Arc::clone(&chat)));
    if let Some(dir) = &cfg.service.static_dir {
        info!("Serving UI from {}", dir);
        app = app.fallback_service(ServeDir::new(dir));
    }

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    chat.dispose().await;
    info!("Shut down");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}

fn normalize(input: &Path, output: &Path) -> Result<()> {
    let audio = AudioNormalizer::new().normalize_file(input)?;
    std::fs::write(output, audio.to_wav_bytes()?)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    info!(
        "Wrote {} ({:.2}s, {} samples at 16kHz)",
        output.display(),
        audio.duration_seconds(),
        audio.len()
    );

    Ok(())
}

async fn record(source: PathBuf, seconds: u64, out: &Path) -> Result<()> {
    let device = CaptureDeviceFactory::create(CaptureSource::File(source))?;
    let mut recorder = Recorder::new(device);
    let mut events = recorder.subscribe();

    let progress = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                RecorderEvent::StateChanged(state) if state.is_recording => {
                    info!("Recording {}", format_duration(state.elapsed_seconds));
                }
                RecorderEvent::Error(message) => error!("Recorder error: {}", message),
                _ => {}
            }
        }
    });

    recorder.start().await?;
    tokio::time::sleep(Duration::from_secs(seconds)).await;
    let blob = recorder.stop().await?;
    progress.abort();

    std::fs::write(out, &blob.data).with_context(|| format!("Failed to write {}", out.display()))?;
    info!(
        "Saved {:.1}s recording ({} bytes, {}) to {}",
        blob.duration_seconds,
        blob.data.len(),
        blob.mime_type,
        out.display()
    );

    Ok(())
}
