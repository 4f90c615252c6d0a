//! Speech synthesis adapter (ElevenLabs-style REST backend).
//!
//! Two modes: single-voice narration for a body of text, and podcast mode
//! where each dialogue turn is synthesized with a per-role voice, separated
//! by a short silence, and concatenated in turn order.
//!
//! Policy: the absence of real narration must never abort assignment
//! generation. If the backend is unconfigured or a call fails, we write a
//! minimal valid placeholder MP3 and report `MediaArtifact::Placeholder`.

use std::path::Path;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::domain::{DialogueTurn, MediaArtifact};
use crate::util::take_chars;

/// Per-call text cap for single-voice synthesis (backend cost/latency bound).
const SINGLE_VOICE_CHAR_CAP: usize = 4000;
/// Per-turn text cap in podcast mode.
const TURN_CHAR_CAP: usize = 1000;

/// Fixed role → voice mapping for podcast mode.
const VOICE_HOST: &str = "EXAVITQu4vr4xnSDxMaL";
const VOICE_EXPERT: &str = "JBFqnCBsd6RMkjVDRZzb";

/// A minimal MPEG-1 Layer 3 frame header plus padding: syntactically valid,
/// effectively silent. Used both as the placeholder artifact and as the
/// inter-turn gap material.
const MP3_FRAME_HEADER: [u8; 4] = [0xFF, 0xFB, 0x90, 0x00];
/// One 417-byte frame is ~26 ms at 128 kbps / 44.1 kHz; 19 frames ≈ 500 ms.
const SILENCE_FRAMES: usize = 19;
const FRAME_PAD_BYTES: usize = 413;

#[derive(Clone)]
pub struct SpeechClient {
  client: reqwest::Client,
  api_key: String,
  base_url: String,
  model_id: String,
}

#[derive(Serialize)]
struct TtsRequest<'a> {
  text: &'a str,
  model_id: &'a str,
}

impl SpeechClient {
  /// Construct the client if we find ELEVENLABS_API_KEY; otherwise None
  /// (callers then take the placeholder path).
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("ELEVENLABS_API_KEY").ok()?;
    let base_url = std::env::var("ELEVENLABS_BASE_URL")
      .unwrap_or_else(|_| "https://api.elevenlabs.io/v1".into());
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(60))
      .build()
      .ok()?;
    Some(Self {
      client,
      api_key,
      base_url,
      model_id: "eleven_multilingual_v2".into(),
    })
  }

  /// One synthesis call: text + voice identity → raw MP3 bytes.
  #[instrument(level = "info", skip(self, text), fields(voice_id, text_len = text.len()))]
  async fn tts(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, String> {
    let url = format!(
      "{}/text-to-speech/{}?output_format=mp3_44100_128",
      self.base_url, voice_id
    );
    let req = TtsRequest { text, model_id: &self.model_id };

    let res = self
      .client
      .post(&url)
      .header("xi-api-key", &self.api_key)
      .header(CONTENT_TYPE, "application/json")
      .json(&req)
      .send()
      .await
      .map_err(|e| e.to_string())?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      return Err(format!("speech backend HTTP {}: {}", status, body));
    }

    // The backend may stream chunks; collect everything into one buffer.
    let bytes = res.bytes().await.map_err(|e| e.to_string())?;
    Ok(bytes.to_vec())
  }
}

/// Map a dialogue role onto its fixed voice identity. Unknown speakers get
/// the Host voice, matching the two-party contract.
fn voice_for_speaker(speaker: &str) -> &'static str {
  match speaker {
    "Expert" => VOICE_EXPERT,
    _ => VOICE_HOST,
  }
}

fn silence_gap() -> Vec<u8> {
  let mut frame = MP3_FRAME_HEADER.to_vec();
  frame.extend(std::iter::repeat(0u8).take(FRAME_PAD_BYTES));
  frame.repeat(SILENCE_FRAMES)
}

fn placeholder_mp3() -> Vec<u8> {
  let mut bytes = MP3_FRAME_HEADER.to_vec();
  bytes.extend(std::iter::repeat(0u8).take(100));
  bytes
}

fn write_placeholder(out_path: &Path) -> MediaArtifact {
  if let Err(e) = std::fs::write(out_path, placeholder_mp3()) {
    warn!(target: "pipeline", path = %out_path.display(), error = %e, "Failed to write placeholder audio");
  } else {
    info!(target: "pipeline", path = %out_path.display(), "Placeholder audio written");
  }
  MediaArtifact::Placeholder(out_path.to_path_buf())
}

/// Single-voice synthesis of one body of text.
#[instrument(level = "info", skip(client, text), fields(text_len = text.len(), configured = client.is_some()))]
pub async fn synthesize_single(
  client: Option<&SpeechClient>,
  text: &str,
  out_path: &Path,
) -> MediaArtifact {
  let Some(client) = client else {
    info!(target: "pipeline", "Speech backend unconfigured, writing placeholder audio");
    return write_placeholder(out_path);
  };
  if text.trim().is_empty() {
    return write_placeholder(out_path);
  }

  let capped = take_chars(text, SINGLE_VOICE_CHAR_CAP);
  match client.tts(&capped, VOICE_EXPERT).await {
    Ok(bytes) => match std::fs::write(out_path, &bytes) {
      Ok(()) => {
        info!(target: "pipeline", path = %out_path.display(), bytes = bytes.len(), "Audio synthesized");
        MediaArtifact::Real(out_path.to_path_buf())
      }
      Err(e) => {
        warn!(target: "pipeline", path = %out_path.display(), error = %e, "Failed to write audio, using placeholder");
        write_placeholder(out_path)
      }
    },
    Err(e) => {
      warn!(target: "pipeline", error = %e, "Audio synthesis failed, using placeholder");
      write_placeholder(out_path)
    }
  }
}

/// Multi-voice podcast synthesis: per-turn voices, ~500 ms silence between
/// turns, concatenated in original order. Any failure degrades to
/// single-voice synthesis of the joined text (which itself degrades to a
/// placeholder when the backend is unavailable).
#[instrument(level = "info", skip(client, turns), fields(turns = turns.len(), configured = client.is_some()))]
pub async fn synthesize_podcast(
  client: Option<&SpeechClient>,
  turns: &[DialogueTurn],
  out_path: &Path,
) -> MediaArtifact {
  let joined = || {
    turns
      .iter()
      .map(|t| t.text.as_str())
      .collect::<Vec<_>>()
      .join(" ")
  };

  let Some(cl) = client else {
    return synthesize_single(None, &joined(), out_path).await;
  };
  if turns.is_empty() {
    return synthesize_single(Some(cl), &joined(), out_path).await;
  }

  let gap = silence_gap();
  let mut combined: Vec<u8> = Vec::new();
  for (i, turn) in turns.iter().enumerate() {
    let voice_id = voice_for_speaker(&turn.speaker);
    let capped = take_chars(&turn.text, TURN_CHAR_CAP);
    info!(
      target: "pipeline",
      segment = i + 1,
      total = turns.len(),
      speaker = %turn.speaker,
      chars = capped.len(),
      "Synthesizing podcast segment"
    );
    match cl.tts(&capped, voice_id).await {
      Ok(bytes) => {
        combined.extend_from_slice(&bytes);
        if i < turns.len() - 1 {
          combined.extend_from_slice(&gap);
        }
      }
      Err(e) => {
        warn!(target: "pipeline", segment = i + 1, error = %e, "Podcast segment failed, falling back to single voice");
        return synthesize_single(Some(cl), &joined(), out_path).await;
      }
    }
  }

  match std::fs::write(out_path, &combined) {
    Ok(()) => {
      info!(target: "pipeline", path = %out_path.display(), bytes = combined.len(), "Podcast synthesized");
      MediaArtifact::Real(out_path.to_path_buf())
    }
    Err(e) => {
      warn!(target: "pipeline", path = %out_path.display(), error = %e, "Failed to write podcast, using placeholder");
      write_placeholder(out_path)
    }
  }
}
