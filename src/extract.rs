//! Text extraction from uploaded source documents.
//!
//! Contract: never fails outward. An absent, unreadable, or unsupported file
//! degrades to `None` ("no text from this source"); the orchestrator decides
//! whether that is fatal. A decode counts as successful only if it yields
//! non-empty text.
//!
//! Supported kinds: `.txt`/`.md` (lossy UTF-8 read), `.pdf`, and the Office
//! ZIP containers `.docx`/`.pptx`. Anything else yields `None` rather than a
//! garbage byte-dump that would end up inside prompts.

use std::io::Read;
use std::path::Path;

use regex::Regex;
use tracing::{info, warn};

/// Extract plain text from a source document, keyed on its extension.
/// Returns `None` on any failure or empty result.
pub fn extract_text(path: &Path) -> Option<String> {
  if !path.exists() {
    warn!(target: "pipeline", path = %path.display(), "Source file not found");
    return None;
  }

  let ext = path
    .extension()
    .and_then(|e| e.to_str())
    .map(|e| e.to_ascii_lowercase())
    .unwrap_or_default();

  let extracted = match ext.as_str() {
    "txt" | "md" => read_plain(path),
    "pdf" => read_pdf(path),
    "docx" => read_docx(path),
    "pptx" => read_pptx(path),
    _ => {
      warn!(target: "pipeline", path = %path.display(), %ext, "Unsupported file type, no text taken");
      None
    }
  };

  match extracted {
    Some(text) => {
      let trimmed = text.trim();
      if trimmed.is_empty() {
        warn!(target: "pipeline", path = %path.display(), "Extraction yielded no text");
        None
      } else {
        info!(target: "pipeline", path = %path.display(), chars = trimmed.chars().count(), "Text extracted");
        Some(trimmed.to_string())
      }
    }
    None => None,
  }
}

fn read_plain(path: &Path) -> Option<String> {
  match std::fs::read(path) {
    Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
    Err(e) => {
      warn!(target: "pipeline", path = %path.display(), error = %e, "Failed to read file");
      None
    }
  }
}

fn read_pdf(path: &Path) -> Option<String> {
  match pdf_extract::extract_text(path) {
    Ok(text) => Some(text),
    Err(e) => {
      warn!(target: "pipeline", path = %path.display(), error = %e, "PDF extraction failed");
      None
    }
  }
}

/// Word document: paragraph text lives in `<w:t>` runs inside `<w:p>` blocks
/// of `word/document.xml`.
fn read_docx(path: &Path) -> Option<String> {
  let xml = read_archive_entry(path, "word/document.xml")?;
  let run = Regex::new(r"<w:t[^>]*>([^<]*)</w:t>").expect("static regex");
  Some(paragraph_text(&xml, "</w:p>", &run))
}

/// PowerPoint deck: one XML part per slide, text in `<a:t>` runs inside
/// `<a:p>` blocks. Slides are concatenated in deck order.
fn read_pptx(path: &Path) -> Option<String> {
  let file = open_archive(path)?;
  let mut archive = match zip::ZipArchive::new(file) {
    Ok(a) => a,
    Err(e) => {
      warn!(target: "pipeline", path = %path.display(), error = %e, "Not a readable pptx archive");
      return None;
    }
  };

  let mut slide_names: Vec<String> = archive
    .file_names()
    .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
    .map(String::from)
    .collect();
  // Name order is lexicographic (slide10 before slide2); sort numerically.
  slide_names.sort_by_key(|n| {
    n.trim_start_matches("ppt/slides/slide")
      .trim_end_matches(".xml")
      .parse::<u32>()
      .unwrap_or(u32::MAX)
  });

  let run = Regex::new(r"<a:t[^>]*>([^<]*)</a:t>").expect("static regex");
  let mut slides = Vec::new();
  for name in slide_names {
    let mut xml = String::new();
    match archive.by_name(&name) {
      Ok(mut entry) => {
        if let Err(e) = entry.read_to_string(&mut xml) {
          warn!(target: "pipeline", path = %path.display(), slide = %name, error = %e, "Failed to read slide XML");
          continue;
        }
      }
      Err(e) => {
        warn!(target: "pipeline", path = %path.display(), slide = %name, error = %e, "Missing slide entry");
        continue;
      }
    }
    let text = paragraph_text(&xml, "</a:p>", &run);
    if !text.is_empty() {
      slides.push(text);
    }
  }
  Some(slides.join("\n"))
}

fn open_archive(path: &Path) -> Option<std::fs::File> {
  match std::fs::File::open(path) {
    Ok(f) => Some(f),
    Err(e) => {
      warn!(target: "pipeline", path = %path.display(), error = %e, "Failed to open file");
      None
    }
  }
}

fn read_archive_entry(path: &Path, name: &str) -> Option<String> {
  let file = open_archive(path)?;
  let mut archive = match zip::ZipArchive::new(file) {
    Ok(a) => a,
    Err(e) => {
      warn!(target: "pipeline", path = %path.display(), error = %e, "Not a readable document archive");
      return None;
    }
  };
  let mut xml = String::new();
  let result = match archive.by_name(name) {
    Ok(mut entry) => match entry.read_to_string(&mut xml) {
      Ok(_) => Some(xml),
      Err(e) => {
        warn!(target: "pipeline", path = %path.display(), entry = %name, error = %e, "Failed to read archive entry");
        None
      }
    },
    Err(e) => {
      warn!(target: "pipeline", path = %path.display(), entry = %name, error = %e, "Archive entry not found");
      None
    }
  };
  result
}

/// Collect run text per paragraph block, one output line per non-empty
/// paragraph.
fn paragraph_text(xml: &str, paragraph_end: &str, run: &Regex) -> String {
  let mut lines = Vec::new();
  for para in xml.split(paragraph_end) {
    // Runs concatenate directly; any spacing is part of the run text.
    let line = run
      .captures_iter(para)
      .map(|c| unescape_entities(&c[1]))
      .collect::<String>();
    let line = line.trim();
    if !line.is_empty() {
      lines.push(line.to_string());
    }
  }
  lines.join("\n")
}

fn unescape_entities(s: &str) -> String {
  s.replace("&lt;", "<")
    .replace("&gt;", ">")
    .replace("&quot;", "\"")
    .replace("&apos;", "'")
    .replace("&amp;", "&")
}
