//! Loading application configuration (prompt templates + sampling profiles) from TOML.
//!
//! See `AppConfig`, `Prompts` and `Profiles` for the expected schema. Defaults
//! are sensible for classroom lesson material; override in TOML if you need to
//! tune tone or structure. Runtime settings (paths, external commands,
//! timeouts) come from the environment via `Settings::from_env`.

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub profiles: Profiles,
}

/// Sampling profile for one variant's generation calls.
/// This is a fixed configuration mapping, not per-call negotiation.
#[derive(Clone, Debug, Deserialize)]
pub struct GenProfile {
  pub model: String,
  pub temperature: f32,
  pub max_output_tokens: u32,
}

/// One profile per variant: tight/cool for structured output (quiz),
/// warmer with a bigger budget for narrative scripts (audio/visual).
#[derive(Clone, Debug, Deserialize)]
pub struct Profiles {
  pub simplified: GenProfile,
  pub audio: GenProfile,
  pub visual: GenProfile,
  pub quiz: GenProfile,
}

impl Default for Profiles {
  fn default() -> Self {
    Self {
      simplified: GenProfile {
        model: "gemini-2.5-flash".into(),
        temperature: 0.5,
        max_output_tokens: 2048,
      },
      audio: GenProfile {
        model: "gemini-2.5-flash".into(),
        temperature: 0.8,
        max_output_tokens: 8192,
      },
      visual: GenProfile {
        model: "gemini-2.5-flash".into(),
        temperature: 0.7,
        max_output_tokens: 8192,
      },
      // Separate model that is better at strict JSON, and a low temperature
      // to keep the structure stable.
      quiz: GenProfile {
        model: "gemini-2.0-flash-exp".into(),
        temperature: 0.3,
        max_output_tokens: 8192,
      },
    }
  }
}

/// Prompt templates used by the variant generators. Placeholders are filled
/// with `util::fill_template`: {subject}, {lesson}, {difficulty_instruction},
/// {guidance}.
#[derive(Clone, Debug, Deserialize)]
pub struct Prompts {
  pub simplified_template: String,
  pub audio_template: String,
  pub visual_template: String,
  // Subject-specific guidance spliced into the visual template.
  pub visual_math_guidance: String,
  pub visual_language_guidance: String,
  pub visual_general_guidance: String,
  // One quiz template per schema.
  pub quiz_socratic_template: String,
  pub quiz_practice_template: String,
  pub quiz_practice_repeatable_template: String,
  pub quiz_timeline_template: String,
  pub quiz_standard_template: String,
  // Difficulty flavoring folded into quiz prompts.
  pub difficulty_easy: String,
  pub difficulty_medium: String,
  pub difficulty_hard: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      simplified_template: "Simplify the following {subject} lesson for a grade 5 reader. \
        Output JSON with keys: text, highlights (array of key points). \
        Text should be concise and clear.\n\nLESSON:\n{lesson}"
        .into(),

      audio_template: "CRITICAL: Return ONLY valid JSON, nothing else. No explanations, no markdown.\n\n\
        Create an educational podcast discussion between a Host and an Expert about the following lesson. \
        The discussion should have 6-10 dialogue exchanges that help students understand the material. \
        Make it engaging and conversational.\n\n\
        Use this EXACT format:\n\
        {\"summary\": \"Brief description of the podcast\", \"discussion\": [\
        {\"speaker\": \"Host\", \"text\": \"Welcome to our lesson on...\"}, \
        {\"speaker\": \"Expert\", \"text\": \"Thanks! Let me explain...\"}]}\n\n\
        LESSON:\n{lesson}\n\n\
        Each speaker should have 2-4 sentences per turn. Host asks questions and summarizes. \
        Expert explains with examples.\n\nReturn ONLY the JSON object."
        .into(),

      visual_template: "CRITICAL INSTRUCTIONS:\n\
        1. Return ONLY valid JSON - no markdown, no code blocks, no explanations\n\
        2. Do NOT wrap the JSON in ```json or ``` markers\n\
        3. Do NOT include trailing commas\n\
        4. Start with { and end with }\n\n\
        Create an educational animated video about: {subject}\n\
        Content: {lesson}\n\n\
        {guidance}\n\n\
        ANIMATION REQUIREMENTS:\n\
        - Use: Write(), Create(), FadeIn(), FadeOut(), Transform()\n\
        - Duration: 30-45 seconds total (use self.wait() to control timing)\n\
        - Multiple visual elements (not just text)\n\
        - Smooth transitions between scenes\n\n\
        Required JSON (NO trailing commas):\n\
        {\"description\": \"Brief description of the video\", \
        \"narration\": [{\"text\": \"Intro explanation\", \"duration\": 8}, \
        {\"text\": \"Main concept with details\", \"duration\": 10}, \
        {\"text\": \"Summary and conclusion\", \"duration\": 8}], \
        \"animation_code\": \"from manim import *\\n\\nclass Lesson(Scene):\\n    def construct(self): ...\"}\n\n\
        Return ONLY the JSON object."
        .into(),

      visual_math_guidance: "MATH-SPECIFIC REQUIREMENTS:\n\
        - Use Axes() to create coordinate systems\n\
        - Use axes.plot(lambda x: ...) to graph actual functions\n\
        - For polynomials: plot quadratic (x**2), cubic (x**3), etc.\n\
        - Show multiple graphs with different colors\n\
        - Use Transform() to morph one graph into another\n\
        - Include axis labels with get_axis_labels()"
        .into(),

      visual_language_guidance: "LANGUAGE-SPECIFIC REQUIREMENTS:\n\
        - Use Text() to display vocabulary, sentences, and translations\n\
        - Show verb conjugations using tables or lists\n\
        - Use Transform() to show how sentences change (e.g., tense, word order)\n\
        - Use different colors to highlight parts of speech\n\
        - Animate text appearing and disappearing to build sentences step-by-step"
        .into(),

      visual_general_guidance: "GENERAL REQUIREMENTS:\n\
        - Use Text() for all text - NO MathTex, NO Tex\n\
        - Include 3-5 text elements with animations\n\
        - Add visual elements: Circle(), Square(), Rectangle() if relevant\n\
        - Use colors: RED, BLUE, GREEN, YELLOW\n\
        - Position: .to_edge(UP), .shift(DOWN*2)"
        .into(),

      quiz_socratic_template: "CRITICAL INSTRUCTIONS:\n\
        1. Return ONLY valid JSON - no markdown, no code blocks, no explanations\n\
        2. Do NOT wrap the JSON in ```json or ``` markers\n\
        3. Do NOT include trailing commas before closing braces or brackets\n\
        4. Start your response directly with { and end with }\n\n\
        {difficulty_instruction}\n\n\
        Create 5-7 Socratic questions to guide student learning about the language concepts. \
        Include guidance hints and follow-up prompts.\n\n\
        Use this EXACT format (notice: NO trailing commas):\n\
        {\"summary\": \"Guided questions to help you learn\", \"quiz_type\": \"socratic\", \
        \"questions\": [{\"question\": \"What do you notice about...\", \
        \"guidance\": \"Think about how...\", \"follow_up\": \"Now consider...\"}]}\n\n\
        LESSON CONTENT:\n{lesson}"
        .into(),

      quiz_practice_template: "Create 8-10 practice problems as a JSON object.\n\n\
        {difficulty_instruction}\n\n\
        CRITICAL JSON FORMATTING RULES:\n\
        1. All strings must use escaped characters: \\n for newlines, \\\" for quotes\n\
        2. Mathematical symbols: use plain text (x^2, \"approximately\")\n\
        3. Write \"degrees\" instead of the degree symbol\n\
        4. NO trailing commas anywhere\n\
        5. Each question MUST be complete and self-contained\n\n\
        Required JSON structure:\n\
        {\"summary\": \"Brief description of quiz\", \"quiz_type\": \"practice\", \
        \"questions\": [{\"question\": \"Problem statement with all necessary info\", \
        \"answer\": \"Complete answer with units\", \"difficulty\": \"easy|medium|hard\", \
        \"solution\": \"Step-by-step explanation\", \
        \"common_mistakes\": [\"Mistake 1\", \"Mistake 2\"]}]}\n\n\
        LESSON CONTENT:\n{lesson}"
        .into(),

      quiz_practice_repeatable_template: "CRITICAL INSTRUCTIONS:\n\
        1. Return ONLY valid JSON - no markdown, no code blocks, no explanations\n\
        2. Do NOT wrap the JSON in ```json or ``` markers\n\
        3. Do NOT include trailing commas before closing braces or brackets\n\
        4. Start your response directly with { and end with }\n\n\
        {difficulty_instruction}\n\n\
        Create 8-10 practice questions on the {subject} material that can be repeated for mastery. \
        Include detailed explanations and real-world applications.\n\n\
        Use this EXACT format (notice: NO trailing commas):\n\
        {\"summary\": \"Practice questions to build understanding\", \
        \"quiz_type\": \"practice_repeatable\", \
        \"questions\": [{\"question\": \"...\", \"answer\": \"...\", \
        \"explanation\": \"...\", \"real_world_example\": \"...\"}]}\n\n\
        LESSON CONTENT:\n{lesson}"
        .into(),

      quiz_timeline_template: "CRITICAL INSTRUCTIONS:\n\
        1. Return ONLY valid JSON - no markdown, no code blocks, no explanations\n\
        2. Do NOT wrap the JSON in ```json or ``` markers\n\
        3. Do NOT include trailing commas before closing braces or brackets\n\
        4. Start your response directly with { and end with }\n\n\
        {difficulty_instruction}\n\n\
        Create a timeline and famous names fill-in-the-blank exercise for history. \
        Include dates, events, and key historical figures. Use ___ for blanks.\n\n\
        Use this EXACT format (notice: NO trailing commas):\n\
        {\"summary\": \"Timeline and key figures to memorize\", \"quiz_type\": \"timeline_fill\", \
        \"timeline_events\": [{\"year\": \"1776\", \
        \"event_description\": \"The ___ of Independence was signed\", \"answer\": \"Declaration\"}], \
        \"famous_people\": [{\"description\": \"___ led the civil rights movement\", \
        \"answer\": \"Martin Luther King Jr.\", \"significance\": \"...\"}]}\n\n\
        LESSON CONTENT:\n{lesson}"
        .into(),

      quiz_standard_template: "Create a 5-question quiz for {subject}. \
        Output JSON with keys: summary, quiz_type: \"standard\", \
        questions (array with question, options, answer, hint).\n\n\
        {difficulty_instruction}\n\n\
        LESSON CONTENT:\n{lesson}"
        .into(),

      difficulty_easy:
        "Focus on basic concepts and straightforward questions. Make problems simple and clear."
          .into(),
      difficulty_medium:
        "Include a mix of straightforward and moderately challenging questions.".into(),
      difficulty_hard:
        "Include complex scenarios and multi-step problems that require deeper thinking.".into(),
    }
  }
}

/// Attempt to load `AppConfig` from APP_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_app_config_from_env() -> Option<AppConfig> {
  let path = std::env::var("APP_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AppConfig>(&s) {
      Ok(cfg) => {
        info!(target: "reflexed_backend", %path, "Loaded app config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "reflexed_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "reflexed_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

/// Runtime settings from the environment. Everything has a default so the
/// server starts with zero configuration.
#[derive(Clone, Debug)]
pub struct Settings {
  /// Root directory for per-assignment scratch/artifact directories.
  pub upload_root: std::path::PathBuf,
  /// External animation renderer command.
  pub renderer_cmd: String,
  /// External audio/video muxer command.
  pub muxer_cmd: String,
  pub render_timeout_secs: u64,
  pub mux_timeout_secs: u64,
  /// Renderer output below this size is treated as a placeholder.
  pub min_render_bytes: u64,
  /// Combined source text beyond this many characters is truncated.
  pub max_source_chars: usize,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      upload_root: "./uploads".into(),
      renderer_cmd: "manim".into(),
      muxer_cmd: "ffmpeg".into(),
      render_timeout_secs: 60,
      mux_timeout_secs: 30,
      min_render_bytes: 10_000,
      max_source_chars: 4000,
    }
  }
}

impl Settings {
  pub fn from_env() -> Self {
    let defaults = Self::default();
    Self {
      upload_root: std::env::var("UPLOAD_ROOT")
        .map(Into::into)
        .unwrap_or(defaults.upload_root),
      renderer_cmd: std::env::var("RENDERER_CMD").unwrap_or(defaults.renderer_cmd),
      muxer_cmd: std::env::var("MUXER_CMD").unwrap_or(defaults.muxer_cmd),
      ..defaults
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_profiles_match_variant_budgets() {
    let p = Profiles::default();
    assert!(p.quiz.temperature < p.audio.temperature);
    assert_eq!(p.simplified.max_output_tokens, 2048);
    assert_eq!(p.quiz.max_output_tokens, 8192);
  }

  #[test]
  fn prompts_templates_carry_placeholders() {
    let p = Prompts::default();
    assert!(p.simplified_template.contains("{lesson}"));
    assert!(p.visual_template.contains("{guidance}"));
    assert!(p.quiz_practice_template.contains("{difficulty_instruction}"));
  }

  #[test]
  fn app_config_parses_partial_toml() {
    let cfg: AppConfig = toml::from_str(
      r#"
      [profiles.quiz]
      model = "gemini-1.5-pro"
      temperature = 0.2
      max_output_tokens = 4096
      "#,
    )
    .unwrap_or_default();
    // Partial profile tables are all-or-nothing per struct; either way we
    // must end up with a usable config.
    assert!(cfg.profiles.simplified.max_output_tokens > 0);
  }
}
