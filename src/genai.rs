//! Minimal Gemini client for our use-cases.
//!
//! We only call generateContent with a per-variant sampling profile and read
//! back plain text. Calls are instrumented and log model names, latencies,
//! and response sizes (not contents).
//!
//! NOTE: We never log the API key and we keep payload truncations short.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::config::GenProfile;
use crate::error::PipelineError;

/// How many times a transient backend failure is attempted before the last
/// error propagates to the orchestrator.
const MAX_ATTEMPTS: usize = 2;
/// Fixed delay between attempts.
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// The seam between variant generators and the concrete text-generation
/// backend. Tests drive the pipeline through scripted implementations.
#[async_trait]
pub trait TextGenerator: Send + Sync {
  /// One generation call. Implementations must concatenate multi-part
  /// responses into a single string and must not retry internally.
  async fn generate(&self, prompt: &str, profile: &GenProfile) -> Result<String, PipelineError>;
}

/// Retry wrapper shared by all variant generators: bounded attempts with a
/// short fixed sleep; the last failure propagates un-wrapped so the
/// orchestrator can classify it.
#[instrument(level = "info", skip(backend, prompt), fields(model = %profile.model, prompt_len = prompt.len()))]
pub async fn generate_with_retry(
  backend: &dyn TextGenerator,
  prompt: &str,
  profile: &GenProfile,
) -> Result<String, PipelineError> {
  let mut last_err = None;
  for attempt in 1..=MAX_ATTEMPTS {
    match backend.generate(prompt, profile).await {
      Ok(text) => {
        info!(target: "pipeline", attempt, chars = text.len(), "Generation response received");
        return Ok(text);
      }
      Err(e) => {
        if attempt < MAX_ATTEMPTS {
          warn!(target: "pipeline", attempt, error = %e, "Generation failed, retrying");
          tokio::time::sleep(RETRY_DELAY).await;
        } else {
          error!(target: "pipeline", attempt, error = %e, "Generation failed after retries");
        }
        last_err = Some(e);
      }
    }
  }
  Err(last_err.unwrap_or_else(|| PipelineError::Backend("no attempts made".into())))
}

/// Gemini REST client. Stateless apart from the connection pool; the sampling
/// profile travels with every call.
#[derive(Clone)]
pub struct GeminiClient {
  client: reqwest::Client,
  api_key: String,
  base_url: String,
}

impl GeminiClient {
  /// Construct the client if we find GEMINI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("GEMINI_API_KEY").ok()?;
    let base_url = std::env::var("GEMINI_BASE_URL")
      .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".into());

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(60))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url })
  }
}

#[async_trait]
impl TextGenerator for GeminiClient {
  #[instrument(level = "info", skip(self, prompt), fields(model = %profile.model))]
  async fn generate(&self, prompt: &str, profile: &GenProfile) -> Result<String, PipelineError> {
    let url = format!(
      "{}/models/{}:generateContent?key={}",
      self.base_url, profile.model, self.api_key
    );
    let req = GenerateContentRequest {
      contents: vec![Content {
        parts: vec![Part { text: prompt.to_string() }],
      }],
      generation_config: GenerationConfig {
        temperature: profile.temperature,
        max_output_tokens: profile.max_output_tokens,
      },
    };

    let start = std::time::Instant::now();
    let res = self
      .client
      .post(&url)
      .header(USER_AGENT, "reflexed-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .json(&req)
      .send()
      .await
      .map_err(|e| PipelineError::Backend(e.to_string()))?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_backend_error(&body).unwrap_or(body);
      return Err(PipelineError::Backend(format!("Gemini HTTP {}: {}", status, msg)));
    }

    let body: GenerateContentResponse =
      res.json().await.map_err(|e| PipelineError::Backend(e.to_string()))?;

    if let Some(usage) = &body.usage_metadata {
      info!(
        prompt_tokens = ?usage.prompt_token_count,
        candidate_tokens = ?usage.candidates_token_count,
        total_tokens = ?usage.total_token_count,
        "Gemini usage"
      );
    }

    // A response may be split across multiple candidates/parts; concatenate
    // all text parts rather than assuming a single scalar result.
    let mut text = String::new();
    for candidate in &body.candidates {
      if let Some(content) = &candidate.content {
        for part in &content.parts {
          if let Some(t) = &part.text {
            text.push_str(t);
          }
        }
      }
    }

    info!(elapsed = ?start.elapsed(), chars = text.len(), "Gemini response assembled");
    Ok(text)
  }
}

// --- Wire DTOs ---

#[derive(Serialize)]
struct GenerateContentRequest {
  contents: Vec<Content>,
  #[serde(rename = "generationConfig")]
  generation_config: GenerationConfig,
}
#[derive(Serialize)]
struct Content {
  parts: Vec<Part>,
}
#[derive(Serialize)]
struct Part {
  text: String,
}
#[derive(Serialize)]
struct GenerationConfig {
  temperature: f32,
  #[serde(rename = "maxOutputTokens")]
  max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
  #[serde(default)]
  candidates: Vec<Candidate>,
  #[serde(rename = "usageMetadata", default)]
  usage_metadata: Option<UsageMetadata>,
}
#[derive(Deserialize)]
struct Candidate {
  #[serde(default)]
  content: Option<CandidateContent>,
}
#[derive(Deserialize)]
struct CandidateContent {
  #[serde(default)]
  parts: Vec<CandidatePart>,
}
#[derive(Deserialize)]
struct CandidatePart {
  #[serde(default)]
  text: Option<String>,
}
#[derive(Deserialize)]
struct UsageMetadata {
  #[serde(rename = "promptTokenCount", default)]
  prompt_token_count: Option<u32>,
  #[serde(rename = "candidatesTokenCount", default)]
  candidates_token_count: Option<u32>,
  #[serde(rename = "totalTokenCount", default)]
  total_token_count: Option<u32>,
}

/// Try to extract a clean error message from a Gemini error body.
fn extract_backend_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap {
    error: EObj,
  }
  #[derive(Deserialize)]
  struct EObj {
    message: String,
  }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};

  struct FlakyBackend {
    calls: AtomicUsize,
    fail_first: usize,
  }

  #[async_trait]
  impl TextGenerator for FlakyBackend {
    async fn generate(&self, _prompt: &str, _profile: &GenProfile) -> Result<String, PipelineError> {
      let n = self.calls.fetch_add(1, Ordering::SeqCst);
      if n < self.fail_first {
        Err(PipelineError::Backend("deadline exceeded".into()))
      } else {
        Ok("ok".into())
      }
    }
  }

  fn profile() -> GenProfile {
    crate::config::Profiles::default().simplified
  }

  #[tokio::test(start_paused = true)]
  async fn retry_recovers_from_one_transient_failure() {
    let backend = FlakyBackend { calls: AtomicUsize::new(0), fail_first: 1 };
    let out = generate_with_retry(&backend, "p", &profile()).await.unwrap();
    assert_eq!(out, "ok");
    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn retry_is_bounded_and_propagates_last_error() {
    let backend = FlakyBackend { calls: AtomicUsize::new(0), fail_first: 10 };
    let err = generate_with_retry(&backend, "p", &profile()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Backend(_)));
    assert_eq!(backend.calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
  }

  #[test]
  fn backend_error_body_is_unwrapped() {
    let body = r#"{"error": {"message": "quota exceeded", "code": 429}}"#;
    assert_eq!(extract_backend_error(body).as_deref(), Some("quota exceeded"));
    assert_eq!(extract_backend_error("not json"), None);
  }
}
