//! Animation rendering and muxing via external command-line tools.
//!
//! The generated animation source is written to the per-assignment scratch
//! directory, the renderable scene name is detected from the source, and the
//! renderer runs with a fast low-quality preset under a hard timeout. Success
//! means exit code 0 AND an output artifact above the size floor; everything
//! else (non-zero exit, timeout, tool not installed, undersized output)
//! degrades to a minimal valid placeholder MP4. Muxing narration into the
//! video is best-effort: failure returns the silent video.

use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use tokio::process::Command;
use tracing::{info, instrument, warn};

use crate::config::Settings;
use crate::domain::MediaArtifact;

/// Scene class used when none can be detected in the generated source.
const DEFAULT_SCENE: &str = "TitleScene";

/// Minimal valid MP4: an ftyp box plus a free box. Enough for players to
/// recognize the container; well under the render size floor.
const PLACEHOLDER_MP4: &[u8] = &[
  0x00, 0x00, 0x00, 0x20, b'f', b't', b'y', b'p', b'i', b's', b'o', b'm', // ftyp box
  0x00, 0x00, 0x02, 0x00, b'i', b's', b'o', b'm', // compatible brands
  b'i', b's', b'o', b'2', b'a', b'v', b'c', b'1', b'm', b'p', b'4', b'1',
  0x00, 0x00, 0x00, 0x08, b'f', b'r', b'e', b'e', // free box for padding
];

/// Identify the renderable scene class in the generated source.
pub fn scene_name(animation_code: &str) -> &str {
  let re = Regex::new(r"class\s+(\w+)\s*\(Scene\)").expect("static regex");
  re.captures(animation_code)
    .and_then(|c| c.get(1))
    .map(|m| animation_code[m.range()].trim())
    .unwrap_or(DEFAULT_SCENE)
}

fn write_placeholder_video(path: &Path) {
  if let Err(e) = std::fs::write(path, PLACEHOLDER_MP4) {
    warn!(target: "pipeline", path = %path.display(), error = %e, "Failed to write placeholder video");
  } else {
    info!(target: "pipeline", path = %path.display(), "Placeholder video written");
  }
}

/// Locate the renderer's output file. The renderer writes under
/// `media/videos/<script-stem>/<quality>/` inside the working directory.
fn find_rendered_video(out_dir: &Path) -> Option<PathBuf> {
  let media_dir = out_dir.join("media").join("videos").join("scene").join("480p15");
  let entries = std::fs::read_dir(&media_dir).ok()?;
  entries
    .filter_map(|e| e.ok())
    .map(|e| e.path())
    .find(|p| p.extension().and_then(|x| x.to_str()) == Some("mp4"))
}

/// Write the animation source to `<out_dir>/scene.py` and render it.
/// Returns the video artifact (real or placeholder at `<out_dir>/<name>`)
/// and the script path.
#[instrument(level = "info", skip(settings, animation_code), fields(code_len = animation_code.len(), %name))]
pub async fn render_animation(
  settings: &Settings,
  animation_code: &str,
  out_dir: &Path,
  name: &str,
) -> (MediaArtifact, PathBuf) {
  let script_path = out_dir.join("scene.py");
  let video_path = out_dir.join(name);

  if let Err(e) = std::fs::write(&script_path, animation_code) {
    warn!(target: "pipeline", path = %script_path.display(), error = %e, "Failed to write animation script");
    write_placeholder_video(&video_path);
    return (MediaArtifact::Placeholder(video_path), script_path);
  }

  let scene = scene_name(animation_code);
  info!(target: "pipeline", %scene, renderer = %settings.renderer_cmd, "Invoking animation renderer");

  // Fast low-quality preset, no cache, explicit output name.
  let mut cmd = Command::new(&settings.renderer_cmd);
  cmd
    .args(["-ql", "--disable_caching", "-o", name])
    .arg(&script_path)
    .arg(scene)
    .current_dir(out_dir)
    .kill_on_drop(true);

  let run = tokio::time::timeout(
    Duration::from_secs(settings.render_timeout_secs),
    cmd.output(),
  )
  .await;

  match run {
    Ok(Ok(output)) if output.status.success() => {
      if let Some(src) = find_rendered_video(out_dir) {
        if let Err(e) = std::fs::copy(&src, &video_path) {
          warn!(target: "pipeline", error = %e, "Failed to copy rendered video");
        }
      }
      let size = std::fs::metadata(&video_path).map(|m| m.len()).unwrap_or(0);
      if size >= settings.min_render_bytes {
        info!(target: "pipeline", path = %video_path.display(), bytes = size, "Animation rendered");
        return (MediaArtifact::Real(video_path), script_path);
      }
      // Renderer "succeeded" but produced nothing real.
      warn!(target: "pipeline", bytes = size, floor = settings.min_render_bytes, "Rendered output below size floor");
    }
    Ok(Ok(output)) => {
      let stderr = String::from_utf8_lossy(&output.stderr);
      warn!(
        target: "pipeline",
        code = ?output.status.code(),
        stderr = %crate::util::trunc_for_log(&stderr, 200),
        "Renderer exited with failure"
      );
    }
    Ok(Err(e)) => {
      warn!(target: "pipeline", error = %e, renderer = %settings.renderer_cmd, "Renderer could not be started");
    }
    Err(_) => {
      warn!(target: "pipeline", timeout_secs = settings.render_timeout_secs, "Renderer timed out");
    }
  }

  if !video_path.exists() {
    write_placeholder_video(&video_path);
  }
  (MediaArtifact::Placeholder(video_path), script_path)
}

/// Combine a rendered video with narration audio. Skipped entirely when the
/// video is a placeholder or below the size floor; any muxer failure returns
/// the original silent video path unchanged.
#[instrument(level = "info", skip(settings), fields(video = %video_path.display(), audio = %audio_path.display()))]
pub async fn mux_audio_into_video(
  settings: &Settings,
  video_path: &Path,
  audio_path: &Path,
  out_dir: &Path,
  name: &str,
) -> PathBuf {
  let original = video_path.to_path_buf();

  let video_size = match std::fs::metadata(video_path) {
    Ok(m) => m.len(),
    Err(_) => {
      warn!(target: "pipeline", "Video missing, skipping mux");
      return original;
    }
  };
  if video_size < settings.min_render_bytes {
    info!(target: "pipeline", bytes = video_size, "Video is placeholder-sized, skipping mux");
    return original;
  }
  if !audio_path.exists() {
    return original;
  }

  let output_path = out_dir.join(name);
  // Copy the video stream, encode audio as AAC, stop at the shorter stream.
  let mut cmd = Command::new(&settings.muxer_cmd);
  cmd
    .arg("-y")
    .arg("-i")
    .arg(video_path)
    .arg("-i")
    .arg(audio_path)
    .args(["-c:v", "copy", "-c:a", "aac", "-shortest"])
    .arg(&output_path)
    .kill_on_drop(true);

  let run = tokio::time::timeout(Duration::from_secs(settings.mux_timeout_secs), cmd.output()).await;

  match run {
    Ok(Ok(output)) if output.status.success() && output_path.exists() => {
      let size = std::fs::metadata(&output_path).map(|m| m.len()).unwrap_or(0);
      info!(target: "pipeline", path = %output_path.display(), bytes = size, "Video and narration combined");
      output_path
    }
    Ok(Ok(output)) => {
      let stderr = String::from_utf8_lossy(&output.stderr);
      warn!(
        target: "pipeline",
        code = ?output.status.code(),
        stderr = %crate::util::trunc_for_log(&stderr, 200),
        "Muxer failed, keeping silent video"
      );
      original
    }
    Ok(Err(e)) => {
      warn!(target: "pipeline", error = %e, muxer = %settings.muxer_cmd, "Muxer could not be started, keeping silent video");
      original
    }
    Err(_) => {
      warn!(target: "pipeline", timeout_secs = settings.mux_timeout_secs, "Muxer timed out, keeping silent video");
      original
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn settings() -> Settings {
    Settings::default()
  }

  #[test]
  fn scene_name_is_detected() {
    let code = "from manim import *\n\nclass PolynomialLesson(Scene):\n    def construct(self):\n        pass\n";
    assert_eq!(scene_name(code), "PolynomialLesson");
  }

  #[test]
  fn scene_name_defaults_when_absent() {
    assert_eq!(scene_name("print('no scene here')"), DEFAULT_SCENE);
  }

  #[tokio::test]
  async fn missing_renderer_yields_placeholder() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = settings();
    s.renderer_cmd = "definitely-not-a-renderer-binary".into();
    let (artifact, script) =
      render_animation(&s, "class TitleScene(Scene):\n    pass\n", dir.path(), "visual_silent.mp4")
        .await;
    assert!(!artifact.is_real());
    assert!(artifact.path().exists());
    assert!(script.exists());
    let bytes = std::fs::read(artifact.path()).unwrap();
    assert_eq!(&bytes[4..8], b"ftyp");
  }

  #[tokio::test]
  async fn mux_is_skipped_for_placeholder_sized_video() {
    let dir = tempfile::tempdir().unwrap();
    let video = dir.path().join("visual_silent.mp4");
    let audio = dir.path().join("narration.mp3");
    std::fs::write(&video, PLACEHOLDER_MP4).unwrap();
    std::fs::write(&audio, [0xFF, 0xFB, 0x90, 0x00]).unwrap();

    let out = mux_audio_into_video(&settings(), &video, &audio, dir.path(), "visual.mp4").await;
    assert_eq!(out, video);
    assert!(!dir.path().join("visual.mp4").exists());
  }

  #[tokio::test]
  async fn mux_failure_returns_original_video() {
    let dir = tempfile::tempdir().unwrap();
    let video = dir.path().join("visual_silent.mp4");
    let audio = dir.path().join("narration.mp3");
    // Big enough to clear the floor so the muxer is actually attempted.
    std::fs::write(&video, vec![0u8; 20_000]).unwrap();
    std::fs::write(&audio, [0xFF, 0xFB, 0x90, 0x00]).unwrap();

    let mut s = settings();
    s.muxer_cmd = "definitely-not-a-muxer-binary".into();
    let out = mux_audio_into_video(&s, &video, &audio, dir.path(), "visual.mp4").await;
    assert_eq!(out, video);
  }
}
