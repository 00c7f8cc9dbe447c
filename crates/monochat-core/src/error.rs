//! Error types for the MonoChat ingestion pipeline.

use thiserror::Error;

/// Errors surfaced to MonoChat callers.
///
/// A failed connect is not an error: [`crate::MonoChat::connect`] reports
/// it as `Ok(None)`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonoChatError {
    /// The engine failed to start; nothing can proceed.
    #[error("engine initialization failed with status {status}")]
    Initialization { status: i32 },

    /// An operation was attempted before the engine was bootstrapped.
    #[error("MonoChat is not initialized")]
    NotInitialized,

    /// Sessions spawn their pump on the current Tokio runtime.
    #[error("no Tokio runtime is running")]
    NoRuntime,

    /// `connect` was called with an empty URL.
    #[error("URL cannot be empty")]
    EmptyUrl,

    /// Platform selector did not name a supported platform.
    #[error("unknown platform: {0} (supported: chzzk, soop)")]
    UnknownPlatform(String),

    /// The engine reported a negative handle while polling a live stream.
    #[error("engine reported invalid handle {handle}")]
    InvalidHandle { handle: i64 },

    /// An accessor was called on a resource that has already been released.
    #[error("{resource} has been released")]
    UseAfterRelease { resource: &'static str },

    /// A consumer wait was interrupted by its cancellation signal.
    #[error("wait cancelled")]
    Cancelled,
}

impl MonoChatError {
    /// Returns `true` for errors that indicate a resource lifecycle bug in
    /// the caller rather than an engine or environment failure.
    pub fn is_lifecycle_bug(&self) -> bool {
        matches!(self, Self::UseAfterRelease { .. })
    }

    /// Returns `true` if the error is fatal to the whole process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Initialization { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(MonoChatError::UseAfterRelease { resource: "message" }.is_lifecycle_bug());
        assert!(!MonoChatError::Cancelled.is_lifecycle_bug());
        assert!(MonoChatError::Initialization { status: 3 }.is_fatal());
        assert!(!MonoChatError::InvalidHandle { handle: -1 }.is_fatal());
    }

    #[test]
    fn display() {
        assert_eq!(
            MonoChatError::UseAfterRelease { resource: "message" }.to_string(),
            "message has been released"
        );
        assert_eq!(
            MonoChatError::Initialization { status: 2 }.to_string(),
            "engine initialization failed with status 2"
        );
    }
}
