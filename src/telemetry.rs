//! Telemetry initialization (tracing/tracing-subscriber).
//!
//! Behavior:
//! - LOG_LEVEL controls the filter (e.g. "debug" or detailed directives like
//!   "info,pipeline=debug").
//! - LOG_FORMAT selects "pretty" (default) or "json" structured logs.
//!
//! Events carry targets so pipeline steps ("pipeline") are distinguishable
//! from process-level concerns ("reflexed_backend") and the HTTP trace layer.

use tracing_subscriber::EnvFilter;

/// Filter applied when LOG_LEVEL is unset: generation pipeline at debug, the
/// HTTP layers at info.
const DEFAULT_DIRECTIVES: &str =
    "info,pipeline=debug,reflexed_backend=debug,tower_http=info,axum=info";

pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    // JSON vs pretty is decided once here; the builder types differ, so branch
    // at init instead of storing a layer.
    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => builder.json().init(),
        _ => builder.init(),
    }
}
