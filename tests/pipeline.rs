//! End-to-end pipeline scenarios against a scripted generation backend:
//! full generation, fatal extraction failure, backend outage, and quiz
//! regeneration. Media tools are absent in the test environment, so audio
//! and video degrade to placeholders without failing anything.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use reflexed_backend::config::{GenProfile, Settings};
use reflexed_backend::domain::{AssignmentStatus, Difficulty, Subject, VariantType};
use reflexed_backend::error::{PipelineError, StoreError};
use reflexed_backend::genai::TextGenerator;
use reflexed_backend::service;
use reflexed_backend::state::AppState;

/// Scripted backend: pops canned responses in order, counts calls.
struct Scripted {
  responses: Mutex<VecDeque<Result<String, String>>>,
  calls: Mutex<usize>,
}

impl Scripted {
  fn new(responses: Vec<Result<String, String>>) -> Arc<Self> {
    Arc::new(Self {
      responses: Mutex::new(responses.into()),
      calls: Mutex::new(0),
    })
  }

  fn call_count(&self) -> usize {
    *self.calls.lock().unwrap()
  }
}

#[async_trait]
impl TextGenerator for Scripted {
  async fn generate(&self, _prompt: &str, _profile: &GenProfile) -> Result<String, PipelineError> {
    *self.calls.lock().unwrap() += 1;
    match self.responses.lock().unwrap().pop_front() {
      Some(r) => r.map_err(PipelineError::Backend),
      None => Ok(String::new()),
    }
  }
}

fn test_state(backend: Arc<Scripted>, upload_root: &std::path::Path) -> AppState {
  let mut settings = Settings::default();
  settings.upload_root = upload_root.to_path_buf();
  // Tools that are guaranteed absent, so media deterministically degrades.
  settings.renderer_cmd = "reflexed-test-no-renderer".into();
  settings.muxer_cmd = "reflexed-test-no-muxer".into();
  AppState::with_parts(Some(backend), None, settings)
}

const SIMPLIFIED_JSON: &str = r#"{"text": "Easy version.", "highlights": ["quadratics"]}"#;
const AUDIO_JSON: &str = r#"{"summary": "A chat about quadratics", "discussion": [
  {"speaker": "Host", "text": "Welcome! Today: quadratics."},
  {"speaker": "Expert", "text": "A parabola is the graph of x squared."}]}"#;
const VISUAL_JSON: &str = r#"{"description": "Parabola animation",
  "narration": [{"text": "Watch the curve open upward.", "duration": 8}],
  "animation_code": "from manim import *\n\nclass QuadScene(Scene):\n    def construct(self):\n        pass\n"}"#;
const QUIZ_JSON: &str = r#"{"summary": "Practice problems", "quiz_type": "practice",
  "questions": [{"question": "Solve x^2 = 4", "answer": "x = 2 or x = -2"}]}"#;

/// Responses for one complete generation run. The visual step renders twice
/// (the renderer is absent, so the first attempt degrades and is retried).
fn full_run_responses() -> Vec<Result<String, String>> {
  vec![
    Ok(SIMPLIFIED_JSON.into()),
    Ok(AUDIO_JSON.into()),
    Ok(VISUAL_JSON.into()),
    Ok(VISUAL_JSON.into()),
    Ok(QUIZ_JSON.into()),
  ]
}

#[tokio::test]
async fn full_generation_produces_ready_assignment_with_four_variants() {
  let dir = tempfile::tempdir().unwrap();
  let backend = Scripted::new(full_run_responses());
  let state = test_state(backend.clone(), dir.path());

  let assignment = service::create_assignment(
    &state,
    "Quadratic equations".into(),
    Subject::Math,
    Some("A quadratic equation has the form ax^2 + bx + c = 0.".into()),
    None,
  )
  .await
  .unwrap();

  assert_eq!(assignment.status, AssignmentStatus::Ready);
  assert!(assignment.error_message.is_none());

  let variants = state.store.variants_for(&assignment.id).await;
  let types: Vec<VariantType> = variants.iter().map(|v| v.variant_type).collect();
  assert_eq!(
    types,
    vec![
      VariantType::Simplified,
      VariantType::Audio,
      VariantType::Visual,
      VariantType::Quiz
    ]
  );

  // Audio degraded to a placeholder file (no speech client configured), but
  // the artifact exists and is recorded.
  let audio = &variants[1];
  let audio_path = &audio.assets["audio_mp3"];
  assert!(audio_path.contains(&assignment.id));
  assert!(std::path::Path::new(audio_path).exists());
  assert_eq!(audio.assets["summary"], "A chat about quadratics");

  // Visual kept the silent placeholder video; narration audio was synthesized.
  let visual = &variants[2];
  assert!(visual.assets["video_mp4"].ends_with("visual_silent.mp4"));
  assert!(std::path::Path::new(&visual.assets["animation_script"]).exists());
  assert!(std::path::Path::new(&visual.assets["narration_audio"]).exists());

  // Quiz payload landed on disk as JSON.
  let quiz = &variants[3];
  let quiz_file = std::fs::read_to_string(&quiz.assets["quiz_json"]).unwrap();
  let parsed: serde_json::Value = serde_json::from_str(&quiz_file).unwrap();
  assert_eq!(parsed["quiz_type"], "practice");
  assert_eq!(parsed["questions"].as_array().unwrap().len(), 1);

  // simplified + audio + visual x2 + quiz
  assert_eq!(backend.call_count(), 5);
}

#[tokio::test]
async fn single_voice_audio_keeps_its_own_artifact() {
  let dir = tempfile::tempdir().unwrap();
  // Empty discussion sends the audio step down the single-voice path.
  let backend = Scripted::new(vec![
    Ok(SIMPLIFIED_JSON.into()),
    Ok(r#"{"summary": "Solo narration", "discussion": []}"#.into()),
    Ok(VISUAL_JSON.into()),
    Ok(VISUAL_JSON.into()),
    Ok(QUIZ_JSON.into()),
  ]);
  let state = test_state(backend, dir.path());

  let assignment = service::create_assignment(
    &state,
    "Narrated only".into(),
    Subject::Science,
    Some("Plate tectonics move continents.".into()),
    None,
  )
  .await
  .unwrap();
  assert_eq!(assignment.status, AssignmentStatus::Ready);

  let variants = state.store.variants_for(&assignment.id).await;
  let audio = &variants[1];
  let visual = &variants[2];

  // The audio artifact must not share a file with the visual narration,
  // which is written later in the sequence.
  assert!(audio.assets["audio_mp3"].ends_with("audio_narration.mp3"));
  assert!(visual.assets["narration_audio"].ends_with("/narration.mp3"));
  assert_ne!(audio.assets["audio_mp3"], visual.assets["narration_audio"]);
  assert!(std::path::Path::new(&audio.assets["audio_mp3"]).exists());
  assert!(std::path::Path::new(&visual.assets["narration_audio"]).exists());
}

#[tokio::test]
async fn assignment_without_content_fails_before_any_generation() {
  let dir = tempfile::tempdir().unwrap();
  let backend = Scripted::new(full_run_responses());
  let state = test_state(backend.clone(), dir.path());

  let assignment = service::create_assignment(
    &state,
    "Empty".into(),
    Subject::Science,
    Some("   ".into()),
    Some("/missing/file.pdf".into()),
  )
  .await
  .unwrap();

  assert_eq!(assignment.status, AssignmentStatus::Failed);
  assert!(assignment.error_message.unwrap().contains("no content"));
  assert!(state.store.variants_for(&assignment.id).await.is_empty());
  assert_eq!(backend.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn backend_outage_fails_assignment_with_zero_variants() {
  let dir = tempfile::tempdir().unwrap();
  let backend = Scripted::new(vec![
    Err("connection refused".into()),
    Err("connection refused".into()),
  ]);
  let state = test_state(backend.clone(), dir.path());

  let assignment = service::create_assignment(
    &state,
    "Unlucky".into(),
    Subject::History,
    Some("The fall of Rome.".into()),
    None,
  )
  .await
  .unwrap();

  assert_eq!(assignment.status, AssignmentStatus::Failed);
  assert!(assignment.error_message.unwrap().contains("connection refused"));
  assert!(state.store.variants_for(&assignment.id).await.is_empty());
  // First variant's two retry attempts, then nothing else runs.
  assert_eq!(backend.call_count(), 2);
}

#[tokio::test]
async fn missing_backend_rejects_creation_without_persisting() {
  let dir = tempfile::tempdir().unwrap();
  let mut settings = Settings::default();
  settings.upload_root = dir.path().to_path_buf();
  let state = AppState::with_parts(None, None, settings);

  let err = service::create_assignment(&state, "t".into(), Subject::Math, Some("x".into()), None)
    .await
    .unwrap_err();
  assert!(matches!(err, PipelineError::BackendUnavailable));
  assert!(state.store.list_assignments().await.is_empty());
}

#[tokio::test]
async fn quiz_regeneration_updates_the_single_quiz_row() {
  let dir = tempfile::tempdir().unwrap();
  let mut responses = full_run_responses();
  responses.push(Ok(r#"{"summary": "Harder now", "quiz_type": "practice",
    "questions": [{"question": "Solve x^2 - 5x + 6 = 0", "answer": "x = 2 or x = 3"},
                  {"question": "Solve 2x^2 = 18", "answer": "x = 3 or x = -3"}]}"#
    .into()));
  let backend = Scripted::new(responses);
  let state = test_state(backend.clone(), dir.path());

  let assignment = service::create_assignment(
    &state,
    "Quadratics".into(),
    Subject::Math,
    Some("Factor and solve.".into()),
    None,
  )
  .await
  .unwrap();
  let original = state
    .store
    .find_variant(&assignment.id, VariantType::Quiz)
    .await
    .unwrap();

  let updated =
    service::regenerate_variant(&state, &assignment.id, VariantType::Quiz, Difficulty::Hard)
      .await
      .unwrap();

  // Same row, new payload, still exactly four variants.
  assert_eq!(updated.id, original.id);
  assert_ne!(updated.content_text, original.content_text);
  assert!(updated.content_text.contains("Harder now"));
  assert!(updated.assets["quiz_json"].ends_with("quiz_hard.json"));
  assert!(std::path::Path::new(&updated.assets["quiz_json"]).exists());
  assert_eq!(state.store.variants_for(&assignment.id).await.len(), 4);

  // The assignment stays ready.
  let a = state.store.get_assignment(&assignment.id).await.unwrap();
  assert_eq!(a.status, AssignmentStatus::Ready);
}

#[tokio::test]
async fn regeneration_is_quiz_only() {
  let dir = tempfile::tempdir().unwrap();
  let backend = Scripted::new(full_run_responses());
  let state = test_state(backend, dir.path());

  let assignment = service::create_assignment(
    &state,
    "Quadratics".into(),
    Subject::Math,
    Some("Factor and solve.".into()),
    None,
  )
  .await
  .unwrap();

  let err =
    service::regenerate_variant(&state, &assignment.id, VariantType::Audio, Difficulty::Easy)
      .await
      .unwrap_err();
  assert!(matches!(err, PipelineError::UnsupportedVariant(t) if t == "audio"));
}

#[tokio::test]
async fn regeneration_of_unknown_assignment_is_not_found() {
  let dir = tempfile::tempdir().unwrap();
  let backend = Scripted::new(vec![]);
  let state = test_state(backend, dir.path());

  let err = service::regenerate_variant(&state, "nope", VariantType::Quiz, Difficulty::Easy)
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    PipelineError::Store(StoreError::AssignmentNotFound(_))
  ));
}
