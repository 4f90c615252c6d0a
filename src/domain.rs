//! Domain records for assignments and their generated variants.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lesson subject. Drives the quiz schema and the visual-prompt guidance.
/// Unknown subjects deserialize to `General` and get the default treatments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subject {
  Math,
  Science,
  Language,
  History,
  Geography,
  #[serde(other)]
  General,
}

impl Subject {
  pub fn as_str(&self) -> &'static str {
    match self {
      Subject::Math => "math",
      Subject::Science => "science",
      Subject::Language => "language",
      Subject::History => "history",
      Subject::Geography => "geography",
      Subject::General => "general",
    }
  }
}

impl std::fmt::Display for Subject {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Assignment lifecycle. `pending → generating → ready | failed`; no way back
/// except single-variant regeneration, which leaves the status untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
  Pending,
  Generating,
  Ready,
  Failed,
}

/// The four alternate renderings of a lesson.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantType {
  Simplified,
  Audio,
  Visual,
  Quiz,
}

impl VariantType {
  pub fn as_str(&self) -> &'static str {
    match self {
      VariantType::Simplified => "simplified",
      VariantType::Audio => "audio",
      VariantType::Visual => "visual",
      VariantType::Quiz => "quiz",
    }
  }
}

impl std::fmt::Display for VariantType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Quiz difficulty. Folded into the prompt as an instruction, never a schema change.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
  Easy,
  #[default]
  Medium,
  Hard,
}

impl Difficulty {
  pub fn as_str(&self) -> &'static str {
    match self {
      Difficulty::Easy => "easy",
      Difficulty::Medium => "medium",
      Difficulty::Hard => "hard",
    }
  }
}

impl std::fmt::Display for Difficulty {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Teacher-created assignment with generated variants.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Assignment {
  pub id: String,
  pub title: String,
  pub subject: Subject,

  // Original content sources: either or both may be present.
  pub original_text: Option<String>,
  pub source_file: Option<String>,

  pub status: AssignmentStatus,
  pub error_message: Option<String>,

  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Assignment {
  pub fn new(
    title: String,
    subject: Subject,
    original_text: Option<String>,
    source_file: Option<String>,
  ) -> Self {
    let now = Utc::now();
    Self {
      id: Uuid::new_v4().to_string(),
      title,
      subject,
      original_text,
      source_file,
      status: AssignmentStatus::Pending,
      error_message: None,
      created_at: now,
      updated_at: now,
    }
  }
}

/// Generated variant record. Only ever persisted fully-formed; the uniqueness
/// of (assignment_id, variant_type) is enforced by the store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssignmentVersion {
  pub id: String,
  pub assignment_id: String,
  pub variant_type: VariantType,
  // Denormalized copy so variants are filterable without a join.
  pub subject: Subject,

  /// Structured payload serialized as JSON text.
  pub content_text: String,
  /// Named output artifacts → storage paths (e.g. "audio_mp3" → ".../podcast.mp3").
  pub assets: BTreeMap<String, String>,

  pub ready: bool,
  pub error_message: Option<String>,

  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl AssignmentVersion {
  pub fn new(
    assignment_id: String,
    variant_type: VariantType,
    subject: Subject,
    content_text: String,
    assets: BTreeMap<String, String>,
  ) -> Self {
    let now = Utc::now();
    Self {
      id: Uuid::new_v4().to_string(),
      assignment_id,
      variant_type,
      subject,
      content_text,
      assets,
      ready: true,
      error_message: None,
      created_at: now,
      updated_at: now,
    }
  }
}

// --- Typed per-variant content contracts ---
//
// Each generator's output deserializes into one of these; the matching
// fallback skeleton guarantees every required key is present even when the
// model omits it, so downstream code is total.

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimplifiedContent {
  pub text: String,
  pub highlights: Vec<String>,
}

/// One turn of the two-party podcast dialogue.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DialogueTurn {
  pub speaker: String,
  pub text: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AudioScript {
  pub summary: String,
  pub discussion: Vec<DialogueTurn>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NarrationSegment {
  pub text: String,
  pub duration: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VisualPlan {
  pub description: String,
  pub narration: Vec<NarrationSegment>,
  pub animation_code: String,
}

/// Quiz payload. The item container depends on the schema: most schemas fill
/// `questions`; the history timeline schema fills `timeline_events` and
/// `famous_people`. Items stay schemaless (`Value`) because their shape is a
/// prompt contract, not pipeline logic.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Quiz {
  pub summary: String,
  pub quiz_type: String,
  #[serde(default)]
  pub questions: Vec<serde_json::Value>,
  #[serde(default)]
  pub timeline_events: Vec<serde_json::Value>,
  #[serde(default)]
  pub famous_people: Vec<serde_json::Value>,
}

impl Quiz {
  /// Question-like items across all schemas; zero means the generation
  /// attempt produced nothing usable.
  pub fn item_count(&self) -> usize {
    self.questions.len() + self.timeline_events.len()
  }
}

/// Outcome of a media synthesis or render step: either a genuine artifact or
/// a minimal valid placeholder written in its place. Media steps never fail
/// the pipeline; degradation is explicit in the type instead.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MediaArtifact {
  Real(PathBuf),
  Placeholder(PathBuf),
}

impl MediaArtifact {
  pub fn path(&self) -> &Path {
    match self {
      MediaArtifact::Real(p) | MediaArtifact::Placeholder(p) => p,
    }
  }

  pub fn is_real(&self) -> bool {
    matches!(self, MediaArtifact::Real(_))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_subject_becomes_general() {
    let s: Subject = serde_json::from_str("\"astronomy\"").unwrap();
    assert_eq!(s, Subject::General);
  }

  #[test]
  fn subject_round_trips_lowercase() {
    assert_eq!(serde_json::to_string(&Subject::Math).unwrap(), "\"math\"");
    let s: Subject = serde_json::from_str("\"history\"").unwrap();
    assert_eq!(s, Subject::History);
  }

  #[test]
  fn difficulty_defaults_to_medium() {
    assert_eq!(Difficulty::default(), Difficulty::Medium);
  }
}
