//! Lenient decoding of model output that is supposed to be JSON.
//!
//! Models are unreliable about returning strict JSON: they wrap it in
//! markdown fences, add prose around it, leave trailing commas, sneak in
//! comments, or substitute smart punctuation. This module repairs those
//! defects in a fixed order and always yields a well-formed object: on any
//! remaining parse failure the caller-supplied fallback is returned
//! unchanged, and on success the fallback is overlaid with the parsed fields
//! (parsed fields win), so every expected key is guaranteed present.

use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::util::trunc_for_log;

/// Repair `text` and parse it as a JSON object, merging over `fallback`.
/// `fallback` must be a JSON object; its keys define the guaranteed shape.
pub fn parse_with_fallback(text: &str, fallback: &Map<String, Value>) -> Map<String, Value> {
  if text.trim().is_empty() {
    warn!(target: "pipeline", "Empty generation response, using fallback");
    return fallback.clone();
  }

  let cleaned = repair(text);

  match serde_json::from_str::<Value>(&cleaned) {
    Ok(Value::Object(parsed)) => {
      debug!(target: "pipeline", keys = parsed.len(), "Parsed repaired JSON object");
      let mut merged = fallback.clone();
      for (k, v) in parsed {
        merged.insert(k, v);
      }
      merged
    }
    Ok(other) => {
      warn!(
        target: "pipeline",
        got = %other.to_string().chars().take(40).collect::<String>(),
        "Repaired JSON is not an object, using fallback"
      );
      fallback.clone()
    }
    Err(e) => {
      warn!(
        target: "pipeline",
        line = e.line(),
        column = e.column(),
        snippet = %trunc_for_log(&cleaned, 200),
        "JSON parsing failed after repair, using fallback"
      );
      fallback.clone()
    }
  }
}

/// Apply the repair steps in order; returns the cleaned candidate text.
fn repair(text: &str) -> String {
  let mut cleaned = text.trim().to_string();

  // 1) Strip a surrounding fenced code block (```json ... ``` or ``` ... ```).
  let fence = Regex::new(r"(?is)```(?:json)?\s*(.*?)\s*```").expect("static regex");
  if let Some(caps) = fence.captures(&cleaned) {
    cleaned = caps[1].trim().to_string();
  }

  // 2) If the text still does not start with '{', slice from the first '{'
  //    to the last '}' to drop surrounding prose.
  if !cleaned.starts_with('{') {
    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
      if start < end {
        cleaned = cleaned[start..=end].to_string();
      }
    }
  }

  // 3) Remove trailing commas immediately before a closing '}' or ']'.
  let trailing_comma = Regex::new(r",(\s*[}\]])").expect("static regex");
  cleaned = trailing_comma.replace_all(&cleaned, "$1").to_string();

  // 4) Strip // line comments and /* */ block comments.
  let line_comment = Regex::new(r"//[^\n]*").expect("static regex");
  cleaned = line_comment.replace_all(&cleaned, "").to_string();
  let block_comment = Regex::new(r"(?s)/\*.*?\*/").expect("static regex");
  cleaned = block_comment.replace_all(&cleaned, "").to_string();

  // 5) Normalize smart punctuation to ASCII equivalents.
  const REPLACEMENTS: &[(char, &str)] = &[
    ('\u{2018}', "'"),
    ('\u{2019}', "'"),
    ('\u{201C}', "\""),
    ('\u{201D}', "\""),
    ('\u{2013}', "-"),
    ('\u{2014}', "--"),
    ('\u{2026}', "..."),
  ];
  for (from, to) in REPLACEMENTS {
    if cleaned.contains(*from) {
      cleaned = cleaned.replace(*from, to);
    }
  }

  cleaned
}

/// Convenience: build a fallback map from a serializable skeleton value.
/// Panics only if the skeleton does not serialize to an object, which is a
/// programming error in the calling generator.
pub fn fallback_map<T: serde::Serialize>(skeleton: &T) -> Map<String, Value> {
  match serde_json::to_value(skeleton) {
    Ok(Value::Object(map)) => map,
    _ => Map::new(),
  }
}
