//! # monochat-engine
//!
//! An in-process implementation of the MonoChat [`Engine`] contract.
//!
//! [`LocalEngine`] keeps two handle tables, one for streams and one for
//! messages, and a Tokio runtime that runs one forwarding task per stream:
//!
//! ```text
//! ChatSource::open(url) ──► MessageFeed ──forward task──► unbounded channel
//!                                                              │ poll_next
//!                                                              ▼
//!                                               message table (id → Message)
//! ```
//!
//! Platform protocols are not part of this crate: register a [`ChatSource`]
//! per [`Platform`]. [`ReplaySource`] plays back a JSON-lines transcript and
//! [`StaticSource`] serves a fixed list of messages.
//!
//! [`Engine`]: monochat_core::Engine
//! [`Platform`]: monochat_core::Platform

pub mod local;
pub mod replay;
pub mod source;

pub use local::LocalEngine;
pub use replay::{parse_transcript, ReplaySource};
pub use source::{ChatSource, MessageFeed, SourceError, StaticSource};
