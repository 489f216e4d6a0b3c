use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use explainer_core::ffmpeg::FfmpegToolkit;
use explainer_core::render::ManimRenderer;
use explainer_core::speech::EspeakSynthesizer;
use explainer_genai::{GeminiClient, GeminiConfig};
use explainer_pipeline::{Collaborators, Pipeline, PipelineConfig};
use explainer_storage::{ArtifactStore, CloudinaryConfig, CloudinaryStore};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use explainer_api::config::ServerConfig;
use explainer_api::router::build_app_router;
use explainer_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "explainer_api=debug,explainer_pipeline=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    let pipeline_config = PipelineConfig::from_env();
    tracing::info!(
        scratch_root = %pipeline_config.scratch_root.display(),
        max_attempts = pipeline_config.max_attempts,
        narration_enabled = pipeline_config.narration_enabled,
        "Loaded pipeline configuration",
    );

    // --- Collaborators ---
    let model = GeminiClient::new(GeminiConfig::from_env()).expect("Failed to build model client");
    tracing::info!(model = %model.model(), "Generative model client created");

    let store: Arc<dyn ArtifactStore> = Arc::new(
        CloudinaryStore::new(CloudinaryConfig::from_env()).expect("Failed to build storage client"),
    );

    let tools = &pipeline_config.tools;
    let collaborators = Collaborators {
        model: Arc::new(model),
        renderer: Arc::new(ManimRenderer::new(&tools.manim)),
        media: Arc::new(FfmpegToolkit::new(
            &tools.ffmpeg,
            &tools.ffprobe,
            pipeline_config.probe_timeout,
            pipeline_config.mux_timeout,
        )),
        speech: Arc::new(EspeakSynthesizer::new(
            &tools.espeak,
            pipeline_config.speech_timeout,
        )),
        store: Arc::clone(&store),
    };

    // --- App state ---
    let shutdown = CancellationToken::new();
    let state = AppState {
        config: Arc::new(config.clone()),
        pipeline: Arc::new(Pipeline::new(pipeline_config, collaborators)),
        store,
        shutdown: shutdown.clone(),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    let signal_token = shutdown.clone();
    let grace = Duration::from_secs(config.shutdown_timeout_secs);
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        // In-flight runs get a grace period before cancellation.
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            signal_token.cancel();
        });
    });

    server.await.expect("Server error");

    shutdown.cancel();
    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
