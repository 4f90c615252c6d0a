//! Application state: the record store, optional external clients, prompt
//! templates, sampling profiles, and runtime settings.
//!
//! One instance is constructed per process and shared via `Arc`; there is no
//! process-wide singleton. Tests build the same struct with a scripted
//! generation backend instead of the real client.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::config::{load_app_config_from_env, Profiles, Prompts, Settings};
use crate::genai::{GeminiClient, TextGenerator};
use crate::speech::SpeechClient;
use crate::store::Store;

pub struct AppState {
    pub store: Store,
    /// Generation backend; absent when no API key is configured. Creation
    /// requests fail cleanly without it.
    pub backend: Option<Arc<dyn TextGenerator>>,
    /// Speech backend; absent means placeholder audio artifacts.
    pub speech: Option<SpeechClient>,
    pub prompts: Prompts,
    pub profiles: Profiles,
    pub settings: Settings,
}

impl AppState {
    /// Build state from env: load config, init clients, prepare the upload root.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg = load_app_config_from_env().unwrap_or_default();
        let settings = Settings::from_env();

        if let Err(e) = std::fs::create_dir_all(&settings.upload_root) {
            warn!(target: "reflexed_backend", root = %settings.upload_root.display(), error = %e, "Could not create upload root");
        }

        let backend: Option<Arc<dyn TextGenerator>> = match GeminiClient::from_env() {
            Some(client) => {
                info!(target: "reflexed_backend", "Gemini enabled.");
                Some(Arc::new(client))
            }
            None => {
                warn!(target: "reflexed_backend", "Gemini disabled (no GEMINI_API_KEY). Assignment creation will fail until configured.");
                None
            }
        };

        let speech = SpeechClient::from_env();
        if speech.is_some() {
            info!(target: "reflexed_backend", "Speech synthesis enabled.");
        } else {
            info!(target: "reflexed_backend", "Speech synthesis disabled (no ELEVENLABS_API_KEY). Placeholder audio will be used.");
        }

        Self {
            store: Store::new(),
            backend,
            speech,
            prompts: cfg.prompts,
            profiles: cfg.profiles,
            settings,
        }
    }

    /// State with explicit parts; used by tests to inject scripted backends.
    pub fn with_parts(
        backend: Option<Arc<dyn TextGenerator>>,
        speech: Option<SpeechClient>,
        settings: Settings,
    ) -> Self {
        Self {
            store: Store::new(),
            backend,
            speech,
            prompts: Prompts::default(),
            profiles: Profiles::default(),
            settings,
        }
    }
}
