//! ReflexED · Lesson Generation Backend
//!
//! - Axum HTTP API for assignments and their generated variants
//! - Optional Gemini + ElevenLabs integration (via environment variables)
//! - Generated artifacts served from the upload root at /uploads
//!
//! Important env variables:
//!   PORT          : u16 (default 3000)
//!   GEMINI_API_KEY     : enables generation if present (creation fails without it)
//!   GEMINI_BASE_URL    : default "https://generativelanguage.googleapis.com/v1beta"
//!   ELEVENLABS_API_KEY : enables speech synthesis (placeholder audio without it)
//!   UPLOAD_ROOT        : artifact directory (default "./uploads")
//!   RENDERER_CMD       : animation renderer (default "manim")
//!   MUXER_CMD          : audio/video muxer (default "ffmpeg")
//!   APP_CONFIG_PATH    : path to TOML config (prompt templates + sampling profiles)
//!   LOG_LEVEL    : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT      : "pretty" (default) or "json"

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use reflexed_backend::routes::build_router;
use reflexed_backend::state::AppState;
use reflexed_backend::telemetry;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Build shared application state (in-memory stores, generation clients, prompts).
  let state = Arc::new(AppState::new());

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state.clone());

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "reflexed_backend", %addr, "HTTP server listening");
  axum::serve(listener, app).await?;
  Ok(())
}
