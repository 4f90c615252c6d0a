//! Assignment orchestration: the lifecycle state machine.
//!
//! `pending → generating → ready | failed`. A creation request persists the
//! assignment in `generating` first (its id names the scratch directory),
//! then runs extraction and the four variant steps in fixed order, each
//! persisting independently. An escaping error flips the assignment to
//! `failed` with the message recorded; variants persisted before the failure
//! stay in place. Regeneration recomputes a single variant and upserts it
//! without touching the assignment's status.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{error, info, instrument};

use crate::domain::{
  Assignment, AssignmentStatus, AssignmentVersion, Difficulty, Subject, VariantType,
};
use crate::error::{PipelineError, PipelineResult};
use crate::extract;
use crate::genai::TextGenerator;
use crate::render;
use crate::speech;
use crate::state::AppState;
use crate::util::take_chars;
use crate::variants;

/// Marker appended when combined source text exceeds the cap.
const TRUNCATION_MARKER: &str = "\n\n[Content truncated for processing]";

/// How many times the full script-generation-plus-render cycle runs before a
/// placeholder video is accepted permanently.
const VISUAL_ATTEMPTS: usize = 2;

/// Create an assignment and synchronously generate all four variants.
/// Always returns the persisted assignment; generation failure is reflected
/// in its `failed` status and error message, not in the `Result`.
#[instrument(level = "info", skip(state, original_text), fields(%title, %subject))]
pub async fn create_assignment(
  state: &AppState,
  title: String,
  subject: Subject,
  original_text: Option<String>,
  source_file: Option<String>,
) -> PipelineResult<Assignment> {
  let backend = state.backend.as_ref().ok_or(PipelineError::BackendUnavailable)?;

  let mut assignment = Assignment::new(title, subject, original_text, source_file);
  // Persist in `generating` before any work so the id exists for artifact namespacing.
  assignment.status = AssignmentStatus::Generating;
  let id = assignment.id.clone();
  state.store.insert_assignment(assignment.clone()).await;
  info!(target: "pipeline", %id, "Assignment created, generation starting");

  match generate_all_variants(state, backend.as_ref(), &assignment).await {
    Ok(()) => {
      let ready = state
        .store
        .set_assignment_status(&id, AssignmentStatus::Ready, None)
        .await?;
      info!(target: "pipeline", %id, "Assignment generation completed");
      Ok(ready)
    }
    Err(e) => {
      error!(target: "pipeline", %id, error = %e, "Assignment generation failed");
      let failed = state
        .store
        .set_assignment_status(&id, AssignmentStatus::Failed, Some(e.to_string()))
        .await?;
      Ok(failed)
    }
  }
}

/// Regenerate one variant with new parameters. Currently only the quiz
/// variant supports regeneration; the result is an idempotent upsert of the
/// single quiz row.
#[instrument(level = "info", skip(state), fields(%assignment_id, %variant_type, %difficulty))]
pub async fn regenerate_variant(
  state: &AppState,
  assignment_id: &str,
  variant_type: VariantType,
  difficulty: Difficulty,
) -> PipelineResult<AssignmentVersion> {
  if variant_type != VariantType::Quiz {
    return Err(PipelineError::UnsupportedVariant(variant_type.to_string()));
  }
  let backend = state.backend.as_ref().ok_or(PipelineError::BackendUnavailable)?;
  let assignment = state
    .store
    .get_assignment(assignment_id)
    .await
    .ok_or_else(|| crate::error::StoreError::AssignmentNotFound(assignment_id.to_string()))?;

  let base_text = combined_source_text(state, &assignment)?;
  let a_dir = assignment_dir(state, &assignment.id)?;

  let quiz = variants::gen_quiz(
    backend.as_ref(),
    &state.prompts,
    &state.profiles.quiz,
    assignment.subject,
    &base_text,
    difficulty,
  )
  .await?;
  let quiz_json = serde_json::to_string(&quiz).unwrap_or_default();
  let quiz_path = write_json(&quiz, &a_dir.join(format!("quiz_{difficulty}.json")))?;
  let assets = BTreeMap::from([("quiz_json".to_string(), path_str(&quiz_path))]);

  match state.store.find_variant(assignment_id, VariantType::Quiz).await {
    Some(existing) => {
      info!(target: "pipeline", %assignment_id, "Updating existing quiz variant in place");
      Ok(state.store.update_variant(&existing.id, quiz_json, assets).await?)
    }
    None => {
      info!(target: "pipeline", %assignment_id, "No quiz variant yet, creating one");
      let v = AssignmentVersion::new(
        assignment.id.clone(),
        VariantType::Quiz,
        assignment.subject,
        quiz_json,
        assets,
      );
      Ok(state.store.insert_variant(v).await?)
    }
  }
}

/// Combine raw text and extracted file text (file text second, blank line
/// between), truncating past the configured cap. Fatal when no source yields
/// any text.
pub fn combined_source_text(state: &AppState, assignment: &Assignment) -> PipelineResult<String> {
  let mut parts: Vec<String> = Vec::new();
  if let Some(text) = &assignment.original_text {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
      parts.push(trimmed.to_string());
    }
  }
  if let Some(file) = &assignment.source_file {
    if let Some(file_text) = extract::extract_text(Path::new(file)) {
      parts.push(file_text);
    }
  }

  if parts.is_empty() {
    return Err(PipelineError::NoContent);
  }

  let combined = parts.join("\n\n");
  let cap = state.settings.max_source_chars;
  if combined.chars().count() > cap {
    info!(
      target: "pipeline",
      chars = combined.chars().count(),
      cap,
      "Truncating combined source text"
    );
    Ok(format!("{}{}", take_chars(&combined, cap), TRUNCATION_MARKER))
  } else {
    Ok(combined)
  }
}

fn assignment_dir(state: &AppState, assignment_id: &str) -> PipelineResult<PathBuf> {
  let dir = state.settings.upload_root.join(assignment_id);
  std::fs::create_dir_all(&dir)?;
  Ok(dir)
}

fn path_str(path: &Path) -> String {
  path.to_string_lossy().into_owned()
}

fn write_json<T: serde::Serialize>(value: &T, path: &Path) -> PipelineResult<PathBuf> {
  let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".into());
  std::fs::write(path, text)?;
  Ok(path.to_path_buf())
}

async fn persist_variant(
  state: &AppState,
  assignment: &Assignment,
  variant_type: VariantType,
  content_text: String,
  assets: BTreeMap<String, String>,
) -> PipelineResult<AssignmentVersion> {
  let v = AssignmentVersion::new(
    assignment.id.clone(),
    variant_type,
    assignment.subject,
    content_text,
    assets,
  );
  Ok(state.store.insert_variant(v).await?)
}

/// The fixed generation sequence. Any `Err` escaping here fails the whole
/// assignment; media degradation is absorbed as placeholders along the way.
async fn generate_all_variants(
  state: &AppState,
  backend: &dyn TextGenerator,
  assignment: &Assignment,
) -> PipelineResult<()> {
  // Extraction failures (no text from any source) raise before any variant work.
  let base_text = combined_source_text(state, assignment)?;
  info!(target: "pipeline", chars = base_text.chars().count(), "Source content assembled");

  let a_dir = assignment_dir(state, &assignment.id)?;
  let subject = assignment.subject;

  // 1) Simplified text
  let simplified = variants::gen_simplified(
    backend,
    &state.prompts,
    &state.profiles.simplified,
    subject,
    &base_text,
  )
  .await?;
  persist_variant(
    state,
    assignment,
    VariantType::Simplified,
    serde_json::to_string(&simplified).unwrap_or_default(),
    BTreeMap::new(),
  )
  .await?;

  // 2) Audio (podcast with two voices, or single-voice narration of the summary)
  let audio = variants::gen_audio_script(
    backend,
    &state.prompts,
    &state.profiles.audio,
    subject,
    &base_text,
  )
  .await?;
  // Own filename: the visual step writes its narration to narration.mp3.
  let audio_artifact = if audio.discussion.is_empty() {
    speech::synthesize_single(
      state.speech.as_ref(),
      &audio.summary,
      &a_dir.join("audio_narration.mp3"),
    )
    .await
  } else {
    speech::synthesize_podcast(state.speech.as_ref(), &audio.discussion, &a_dir.join("podcast.mp3"))
      .await
  };
  let audio_assets = BTreeMap::from([
    ("audio_mp3".to_string(), path_str(audio_artifact.path())),
    ("summary".to_string(), audio.summary.clone()),
  ]);
  persist_variant(
    state,
    assignment,
    VariantType::Audio,
    serde_json::to_string(&audio).unwrap_or_default(),
    audio_assets,
  )
  .await?;

  // 3) Visual (script + narration + render, retried once when the render
  //    comes back as a placeholder)
  let mut plan = None;
  let mut video = None;
  let mut script_path = None;
  let mut narration_audio: Option<PathBuf> = None;

  for attempt in 1..=VISUAL_ATTEMPTS {
    info!(target: "pipeline", attempt, total = VISUAL_ATTEMPTS, "Visual generation attempt");
    let p = variants::gen_visual_plan(
      backend,
      &state.prompts,
      &state.profiles.visual,
      subject,
      &base_text,
    )
    .await?;

    if !p.narration.is_empty() {
      let joined: Vec<&str> = p.narration.iter().map(|s| s.text.as_str()).collect();
      let artifact = speech::synthesize_single(
        state.speech.as_ref(),
        &joined.join(" "),
        &a_dir.join("narration.mp3"),
      )
      .await;
      narration_audio = Some(artifact.path().to_path_buf());
    }

    let (v, s) =
      render::render_animation(&state.settings, &p.animation_code, &a_dir, "visual_silent.mp4")
        .await;
    let rendered_real = v.is_real();
    plan = Some(p);
    video = Some(v);
    script_path = Some(s);
    if rendered_real {
      info!(target: "pipeline", attempt, "Valid video rendered");
      break;
    }
  }
  // The loop always runs at least once.
  let plan = plan.ok_or_else(|| PipelineError::Backend("visual generation produced no plan".into()))?;
  let video = video.ok_or_else(|| PipelineError::Backend("visual generation produced no video".into()))?;
  let script_path = script_path.unwrap_or_else(|| a_dir.join("scene.py"));

  let final_video = match &narration_audio {
    Some(audio_path) if video.is_real() => {
      render::mux_audio_into_video(&state.settings, video.path(), audio_path, &a_dir, "visual.mp4")
        .await
    }
    _ => video.path().to_path_buf(),
  };

  let visual_assets = BTreeMap::from([
    ("video_mp4".to_string(), path_str(&final_video)),
    ("animation_script".to_string(), path_str(&script_path)),
    (
      "narration_audio".to_string(),
      narration_audio.as_deref().map(path_str).unwrap_or_default(),
    ),
  ]);
  persist_variant(
    state,
    assignment,
    VariantType::Visual,
    serde_json::to_string(&plan).unwrap_or_default(),
    visual_assets,
  )
  .await?;

  // 4) Quiz
  let quiz = variants::gen_quiz(
    backend,
    &state.prompts,
    &state.profiles.quiz,
    subject,
    &base_text,
    Difficulty::default(),
  )
  .await?;
  let quiz_path = write_json(&quiz, &a_dir.join("quiz.json"))?;
  persist_variant(
    state,
    assignment,
    VariantType::Quiz,
    serde_json::to_string(&quiz).unwrap_or_default(),
    BTreeMap::from([("quiz_json".to_string(), path_str(&quiz_path))]),
  )
  .await?;

  info!(target: "pipeline", id = %assignment.id, "All variants generated");
  Ok(())
}
