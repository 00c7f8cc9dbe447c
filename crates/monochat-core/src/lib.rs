//! # monochat-core
//!
//! Consumer-side ingestion pipeline for MonoChat.
//!
//! # Overview
//!
//! MonoChat turns a live chat/donation feed produced by an external engine
//! into a stream of decoded message objects that any number of tasks can
//! consume. The engine owns all protocol work and exposes an opaque,
//! handle-based call surface; this crate owns everything built on top of it:
//!
//! - [`Engine`]: the handle-based call surface every engine implements
//! - [`ResourceGuard`]: exactly-once release of a [`NativeHandle`]
//! - [`ChatMessage`]: one decoded event, released on `free()` or drop
//! - [`StreamSession`]: one connection, a background pump and a FIFO buffer
//! - [`MonoChat`]: connection factory mapping a [`Platform`] to a connect call
//! - [`install`] / [`connect`]: process-wide, init-once bootstrap
//!
//! ```text
//! MonoChat::connect ──► StreamSession ──spawns──► pump task
//!                            ▲                       │ Engine::poll_next
//!                            │ take / try_take       ▼
//!                        consumers ◄──── FIFO ◄── ChatMessage
//! ```

pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod guard;
pub mod handle;
pub mod message;
pub mod session;

pub use client::{connect, global, install, MonoChat};
pub use config::SessionConfig;
pub use engine::{Engine, Platform};
pub use error::MonoChatError;
pub use guard::ResourceGuard;
pub use handle::{NativeHandle, PollOutcome};
pub use message::{ChatMessage, Message};
pub use session::{CloseReason, SessionStats, StreamSession};

/// Convenience alias used throughout the crate.
pub type Result<T, E = MonoChatError> = std::result::Result<T, E>;
