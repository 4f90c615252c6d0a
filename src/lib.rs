//! ReflexED backend library: lesson-variant generation pipeline plus the HTTP
//! API that drives it. The binary in `main.rs` wires this up to a listener;
//! integration tests exercise the pipeline directly through `service`.

pub mod config;
pub mod domain;
pub mod error;
pub mod extract;
pub mod genai;
pub mod protocol;
pub mod render;
pub mod repair;
pub mod routes;
pub mod service;
pub mod speech;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod util;
pub mod variants;
