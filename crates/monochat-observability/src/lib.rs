//! # monochat-observability
//!
//! Structured logging for MonoChat.
//!
//! Library crates only emit `tracing` events; binaries call
//! [`init_tracing`] once at startup. Levels are configurable globally and
//! per component, and output is either human-readable text or JSON lines
//! for log shippers.

pub mod tracing_setup;

pub use tracing_setup::{directives, init_tracing, LogConfig};
