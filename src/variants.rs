//! The four variant-generation policies: simplified text, podcast script,
//! visual plan, and quiz.
//!
//! Each policy fills its prompt template, calls the generation backend
//! through the bounded retry wrapper, and decodes the response into a typed
//! contract. A fallback skeleton with every required key is supplied to the
//! repair step, so the result is always well-formed; a type-level mismatch
//! after repair resolves to the typed fallback itself. Only backend errors
//! (after retries) propagate.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::config::{GenProfile, Prompts};
use crate::domain::{
  AudioScript, DialogueTurn, NarrationSegment, Quiz, SimplifiedContent, Subject, VisualPlan,
  Difficulty,
};
use crate::error::PipelineError;
use crate::genai::{generate_with_retry, TextGenerator};
use crate::repair;
use crate::util::{fill_template, take_chars};

/// Prompt-size caps per variant (characters of lesson text).
const SIMPLIFIED_LESSON_CAP: usize = 2000;
const AUDIO_LESSON_CAP: usize = 2500;
const VISUAL_LESSON_CAP: usize = 2000;
const QUIZ_LESSON_CAP: usize = 3000;

/// Quiz generation retries the whole generate-and-parse cycle this many
/// times when zero question-like items come back.
const QUIZ_EMPTY_RETRIES: usize = 2;

/// Repair-decode `raw` into `T`, guaranteeing every key of the fallback
/// skeleton; if the merged value does not satisfy `T`, the fallback wins.
fn decode_or<T>(raw: &str, fallback: T) -> T
where
  T: Serialize + DeserializeOwned,
{
  let skeleton = repair::fallback_map(&fallback);
  let merged = repair::parse_with_fallback(raw, &skeleton);
  match serde_json::from_value::<T>(Value::Object(merged)) {
    Ok(v) => v,
    Err(e) => {
      warn!(target: "pipeline", error = %e, "Repaired JSON did not satisfy the variant contract, using fallback");
      fallback
    }
  }
}

/// Simplified-text generator: `{text, highlights[]}`.
#[instrument(level = "info", skip(backend, prompts, profile, text), fields(%subject, text_len = text.len()))]
pub async fn gen_simplified(
  backend: &dyn TextGenerator,
  prompts: &Prompts,
  profile: &GenProfile,
  subject: Subject,
  text: &str,
) -> Result<SimplifiedContent, PipelineError> {
  let fallback = SimplifiedContent { text: text.to_string(), highlights: vec![] };
  let prompt = fill_template(
    &prompts.simplified_template,
    &[("subject", subject.as_str()), ("lesson", &take_chars(text, SIMPLIFIED_LESSON_CAP))],
  );
  let raw = generate_with_retry(backend, &prompt, profile).await?;
  let result = decode_or(&raw, fallback);
  info!(target: "pipeline", chars = result.text.len(), highlights = result.highlights.len(), "Simplified text generated");
  Ok(result)
}

/// Audio-script generator: a Host/Expert podcast dialogue.
#[instrument(level = "info", skip(backend, prompts, profile, text), fields(%subject, text_len = text.len()))]
pub async fn gen_audio_script(
  backend: &dyn TextGenerator,
  prompts: &Prompts,
  profile: &GenProfile,
  subject: Subject,
  text: &str,
) -> Result<AudioScript, PipelineError> {
  let fallback = AudioScript {
    summary: "Educational podcast discussion".into(),
    discussion: vec![DialogueTurn { speaker: "Host".into(), text: take_chars(text, 500) }],
  };
  let prompt = fill_template(
    &prompts.audio_template,
    &[("subject", subject.as_str()), ("lesson", &take_chars(text, AUDIO_LESSON_CAP))],
  );
  let raw = generate_with_retry(backend, &prompt, profile).await?;
  let result = decode_or(&raw, fallback);
  info!(target: "pipeline", segments = result.discussion.len(), "Audio script generated");
  Ok(result)
}

/// Subject-specific guidance spliced into the visual prompt. The output
/// contract is uniform; only the prompt differs.
fn visual_guidance<'a>(prompts: &'a Prompts, subject: Subject) -> &'a str {
  match subject {
    Subject::Math => &prompts.visual_math_guidance,
    Subject::Language => &prompts.visual_language_guidance,
    _ => &prompts.visual_general_guidance,
  }
}

/// Minimal animation script that only displays a title. Used when the model
/// supplies no usable animation code.
pub fn default_animation_code(title: &str) -> String {
  let mut safe = take_chars(title.trim(), 60);
  if safe.is_empty() {
    safe = "Lesson".into();
  }
  safe = safe.replace('\\', "\\\\").replace('"', "\\\"");
  safe = safe
    .chars()
    .map(|c| if c.is_control() { ' ' } else { c })
    .collect();
  let safe = safe.split_whitespace().collect::<Vec<_>>().join(" ");

  format!(
    "from manim import *\n\n\
     class TitleScene(Scene):\n\
     \x20   def construct(self):\n\
     \x20       title = Text(\"{safe}\")\n\
     \x20       self.play(Write(title))\n\
     \x20       self.wait(1)\n"
  )
}

/// Visual-script generator: `{description, narration[], animation_code}`.
#[instrument(level = "info", skip(backend, prompts, profile, text), fields(%subject, text_len = text.len()))]
pub async fn gen_visual_plan(
  backend: &dyn TextGenerator,
  prompts: &Prompts,
  profile: &GenProfile,
  subject: Subject,
  text: &str,
) -> Result<VisualPlan, PipelineError> {
  let fallback = VisualPlan {
    description: format!("Visual animation for {subject} lesson based on the provided content."),
    narration: vec![NarrationSegment { text: take_chars(text, 200), duration: 10.0 }],
    animation_code: default_animation_code(text),
  };
  let prompt = fill_template(
    &prompts.visual_template,
    &[
      ("subject", subject.as_str()),
      ("lesson", &take_chars(text, VISUAL_LESSON_CAP)),
      ("guidance", visual_guidance(prompts, subject)),
    ],
  );
  let raw = generate_with_retry(backend, &prompt, profile).await?;
  let result = decode_or(&raw, fallback);
  info!(
    target: "pipeline",
    description_chars = result.description.len(),
    code_chars = result.animation_code.len(),
    "Visual plan generated"
  );
  Ok(result)
}

/// The quiz schema each subject maps onto.
pub fn quiz_schema(subject: Subject) -> &'static str {
  match subject {
    Subject::Language => "socratic",
    Subject::Math => "practice",
    Subject::Science | Subject::Geography => "practice_repeatable",
    Subject::History => "timeline_fill",
    Subject::General => "standard",
  }
}

fn quiz_template<'a>(prompts: &'a Prompts, subject: Subject) -> &'a str {
  match subject {
    Subject::Language => &prompts.quiz_socratic_template,
    Subject::Math => &prompts.quiz_practice_template,
    Subject::Science | Subject::Geography => &prompts.quiz_practice_repeatable_template,
    Subject::History => &prompts.quiz_timeline_template,
    Subject::General => &prompts.quiz_standard_template,
  }
}

fn difficulty_instruction<'a>(prompts: &'a Prompts, difficulty: Difficulty) -> &'a str {
  match difficulty {
    Difficulty::Easy => &prompts.difficulty_easy,
    Difficulty::Medium => &prompts.difficulty_medium,
    Difficulty::Hard => &prompts.difficulty_hard,
  }
}

/// Quiz generator: per-subject schema, difficulty folded into the prompt.
/// Quiz structure is the most failure-prone to extract, so the whole
/// generate-and-parse cycle retries when zero items come back; each retry
/// starts from scratch (no cross-attempt merging).
#[instrument(level = "info", skip(backend, prompts, profile, text), fields(%subject, %difficulty, text_len = text.len()))]
pub async fn gen_quiz(
  backend: &dyn TextGenerator,
  prompts: &Prompts,
  profile: &GenProfile,
  subject: Subject,
  text: &str,
  difficulty: Difficulty,
) -> Result<Quiz, PipelineError> {
  let schema = quiz_schema(subject);
  let prompt = fill_template(
    quiz_template(prompts, subject),
    &[
      ("subject", subject.as_str()),
      ("lesson", &take_chars(text, QUIZ_LESSON_CAP)),
      ("difficulty_instruction", difficulty_instruction(prompts, difficulty)),
    ],
  );

  let mut last = fallback_quiz(subject, schema);
  for attempt in 1..=QUIZ_EMPTY_RETRIES {
    let raw = generate_with_retry(backend, &prompt, profile).await?;
    let result = decode_or(&raw, fallback_quiz(subject, schema));
    let items = result.item_count();
    if items > 0 {
      info!(target: "pipeline", %schema, items, attempt, "Quiz generated");
      return Ok(result);
    }
    warn!(
      target: "pipeline",
      %schema,
      attempt,
      retries = QUIZ_EMPTY_RETRIES,
      "Quiz attempt produced zero items"
    );
    last = result;
  }

  info!(target: "pipeline", %schema, items = 0, "Quiz fell back to empty question set");
  Ok(last)
}

fn fallback_quiz(subject: Subject, schema: &str) -> Quiz {
  Quiz {
    summary: format!("{subject} practice exercise"),
    quiz_type: schema.to_string(),
    questions: vec![],
    timeline_events: vec![],
    famous_people: vec![],
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use async_trait::async_trait;
  use std::sync::Mutex;

  /// Scripted backend: pops canned responses in order, records prompts.
  struct Scripted {
    responses: Mutex<Vec<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
  }

  impl Scripted {
    fn new(responses: Vec<Result<String, String>>) -> Self {
      Self { responses: Mutex::new(responses), prompts: Mutex::new(vec![]) }
    }
    fn seen_prompts(&self) -> Vec<String> {
      self.prompts.lock().unwrap().clone()
    }
  }

  #[async_trait]
  impl TextGenerator for Scripted {
    async fn generate(&self, prompt: &str, _profile: &GenProfile) -> Result<String, PipelineError> {
      self.prompts.lock().unwrap().push(prompt.to_string());
      let mut responses = self.responses.lock().unwrap();
      if responses.is_empty() {
        return Ok(String::new());
      }
      responses.remove(0).map_err(PipelineError::Backend)
    }
  }

  fn prompts() -> Prompts {
    Prompts::default()
  }

  fn profiles() -> crate::config::Profiles {
    crate::config::Profiles::default()
  }

  #[tokio::test]
  async fn simplified_falls_back_to_source_text() {
    let backend = Scripted::new(vec![Ok("this is not json".into())]);
    let out = gen_simplified(&backend, &prompts(), &profiles().simplified, Subject::Science, "The water cycle.")
      .await
      .unwrap();
    assert_eq!(out.text, "The water cycle.");
    assert!(out.highlights.is_empty());
  }

  #[tokio::test]
  async fn simplified_parses_model_output() {
    let backend = Scripted::new(vec![Ok(
      "```json\n{\"text\": \"Water moves in a loop.\", \"highlights\": [\"evaporation\"]}\n```".into(),
    )]);
    let out = gen_simplified(&backend, &prompts(), &profiles().simplified, Subject::Science, "long text")
      .await
      .unwrap();
    assert_eq!(out.text, "Water moves in a loop.");
    assert_eq!(out.highlights, vec!["evaporation"]);
  }

  #[tokio::test]
  async fn type_mismatch_resolves_to_typed_fallback() {
    // highlights has the wrong type; the merged object fails the contract.
    let backend = Scripted::new(vec![Ok("{\"text\": \"x\", \"highlights\": \"oops\"}".into())]);
    let out = gen_simplified(&backend, &prompts(), &profiles().simplified, Subject::Math, "source")
      .await
      .unwrap();
    assert_eq!(out.text, "source");
  }

  #[tokio::test]
  async fn audio_fallback_is_single_host_turn() {
    let backend = Scripted::new(vec![Ok(String::new())]);
    let out = gen_audio_script(&backend, &prompts(), &profiles().audio, Subject::History, "The Roman Empire rose and fell.")
      .await
      .unwrap();
    assert_eq!(out.discussion.len(), 1);
    assert_eq!(out.discussion[0].speaker, "Host");
    assert!(out.discussion[0].text.starts_with("The Roman Empire"));
  }

  #[tokio::test]
  async fn visual_fallback_supplies_title_scene() {
    let backend = Scripted::new(vec![Ok("garbage".into())]);
    let out = gen_visual_plan(&backend, &prompts(), &profiles().visual, Subject::Geography, "Rivers of Europe")
      .await
      .unwrap();
    assert!(out.animation_code.contains("class TitleScene(Scene)"));
    assert!(out.animation_code.contains("Rivers of Europe"));
    assert_eq!(out.narration.len(), 1);
  }

  #[tokio::test]
  async fn visual_prompt_guidance_differs_by_subject() {
    let backend = Scripted::new(vec![Ok("{}".into()), Ok("{}".into())]);
    gen_visual_plan(&backend, &prompts(), &profiles().visual, Subject::Math, "x").await.unwrap();
    gen_visual_plan(&backend, &prompts(), &profiles().visual, Subject::Language, "x").await.unwrap();
    let seen = backend.seen_prompts();
    assert!(seen[0].contains("Axes()"));
    assert!(seen[1].contains("vocabulary"));
  }

  #[test]
  fn quiz_schema_mapping_covers_all_subjects() {
    assert_eq!(quiz_schema(Subject::Language), "socratic");
    assert_eq!(quiz_schema(Subject::Math), "practice");
    assert_eq!(quiz_schema(Subject::Science), "practice_repeatable");
    assert_eq!(quiz_schema(Subject::Geography), "practice_repeatable");
    assert_eq!(quiz_schema(Subject::History), "timeline_fill");
    assert_eq!(quiz_schema(Subject::General), "standard");
  }

  #[tokio::test]
  async fn quiz_type_survives_zero_question_fallback() {
    // Both attempts return unusable output; the fallback still carries the
    // subject's schema tag.
    let backend = Scripted::new(vec![Ok("nope".into()), Ok("nope".into())]);
    let out = gen_quiz(&backend, &prompts(), &profiles().quiz, Subject::History, "WW2", Difficulty::Medium)
      .await
      .unwrap();
    assert_eq!(out.quiz_type, "timeline_fill");
    assert_eq!(out.item_count(), 0);
    assert_eq!(backend.seen_prompts().len(), 2);
  }

  #[tokio::test]
  async fn quiz_retries_once_then_succeeds() {
    let good = "{\"summary\": \"s\", \"quiz_type\": \"practice\", \"questions\": [{\"question\": \"2+2?\", \"answer\": \"4\"}]}";
    let backend = Scripted::new(vec![Ok("{\"questions\": []}".into()), Ok(good.into())]);
    let out = gen_quiz(&backend, &prompts(), &profiles().quiz, Subject::Math, "arithmetic", Difficulty::Easy)
      .await
      .unwrap();
    assert_eq!(out.item_count(), 1);
    assert_eq!(backend.seen_prompts().len(), 2);
  }

  #[tokio::test]
  async fn quiz_difficulty_is_folded_into_prompt() {
    let backend = Scripted::new(vec![Ok("{\"questions\": [{\"q\": 1}]}".into())]);
    gen_quiz(&backend, &prompts(), &profiles().quiz, Subject::Math, "algebra", Difficulty::Hard)
      .await
      .unwrap();
    let seen = backend.seen_prompts();
    assert!(seen[0].contains("multi-step problems"));
  }

  #[tokio::test]
  async fn timeline_events_count_as_items() {
    let raw = "{\"summary\": \"s\", \"quiz_type\": \"timeline_fill\", \
               \"timeline_events\": [{\"year\": \"1776\"}], \"famous_people\": []}";
    let backend = Scripted::new(vec![Ok(raw.into())]);
    let out = gen_quiz(&backend, &prompts(), &profiles().quiz, Subject::History, "independence", Difficulty::Medium)
      .await
      .unwrap();
    assert_eq!(out.item_count(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn backend_error_propagates_unwrapped() {
    let backend = Scripted::new(vec![Err("timeout".into()), Err("timeout".into())]);
    let err = gen_simplified(&backend, &prompts(), &profiles().simplified, Subject::Math, "x")
      .await
      .unwrap_err();
    assert!(matches!(err, PipelineError::Backend(m) if m == "timeout"));
  }

  #[test]
  fn default_animation_code_sanitizes_title() {
    let code = default_animation_code("Line\nwith \"quotes\" and \\ slashes");
    assert!(code.contains("class TitleScene(Scene)"));
    assert!(code.contains(r#"Text("Line with \"quotes\" and \\ slashes")"#));
  }
}
