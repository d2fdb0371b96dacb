use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

mod api;
mod core;
mod error;
mod stt;
mod tts;

use api::routes::{create_router, AppState};
use stt::{SttModel, WhisperStt};
use tts::{KokoroEngine, TtsPipeline};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Configuration from environment
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "8000".to_string())
        .parse()
        .expect("PORT must be a number");
    let models_dir =
        PathBuf::from(std::env::var("MODELS_DIR").unwrap_or_else(|_| "./models".to_string()));
    let stt_language = std::env::var("STT_LANGUAGE").unwrap_or_else(|_| "en".to_string());

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .expect("Invalid address");

    tracing::info!("Yappr Speech Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Models directory: {}", models_dir.display());

    let (tts, stt) = load_models(&models_dir, &stt_language);

    // Create app state
    let state = Arc::new(AppState { tts, stt });

    // Create router
    let app = create_router(state);

    tracing::info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .await
        .expect("Server error");
}

fn load_models(
    models_dir: &Path,
    stt_language: &str,
) -> (Option<Arc<dyn TtsPipeline>>, Option<Arc<dyn SttModel>>) {
    // Test mode runs the HTTP layer with no models at all
    if std::env::var("YAPPR_TEST").is_ok() {
        tracing::info!("YAPPR_TEST set, skipping model loading");
        return (None, None);
    }

    // The server is useless without synthesis; bail out if it cannot load
    let tts: Arc<dyn TtsPipeline> = match KokoroEngine::load(models_dir) {
        Ok(engine) => {
            tracing::info!("TTS model loaded");
            Arc::new(engine)
        }
        Err(e) => {
            tracing::error!("Failed to load TTS model: {}", e);
            std::process::exit(1);
        }
    };

    // Transcription degrades to 503 responses when its model is missing
    let stt_path = models_dir.join("ggml-base.en.bin");
    let stt: Option<Arc<dyn SttModel>> = match WhisperStt::load(&stt_path, stt_language) {
        Ok(model) => {
            tracing::info!("STT model loaded");
            Some(Arc::new(model))
        }
        Err(e) => {
            tracing::warn!("Failed to load STT model: {} (transcription disabled)", e);
            None
        }
    };

    (Some(tts), stt)
}
