//! The `Engine` trait: the opaque, handle-based call surface MonoChat
//! builds on.

use std::fmt;
use std::str::FromStr;

use crate::error::MonoChatError;
use crate::handle::NativeHandle;

/// Streaming platform selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// Naver Chzzk. URLs are chat-source or live-status API endpoints.
    Chzzk,
    /// SOOP (AfreecaTV). URLs are Aqua component URLs with query parameters.
    Soop,
}

impl Platform {
    pub const ALL: [Platform; 2] = [Platform::Chzzk, Platform::Soop];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chzzk => "chzzk",
            Self::Soop => "soop",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = MonoChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chzzk" => Ok(Self::Chzzk),
            "soop" => Ok(Self::Soop),
            _ => Err(MonoChatError::UnknownPlatform(s.to_string())),
        }
    }
}

/// The call surface of an external chat engine.
///
/// Every method is a short, non-blocking call. Handles follow the
/// [`NativeHandle`] sign convention. Release calls are best effort and
/// their status is ignored by MonoChat.
///
/// # Thread Safety
/// Implementations must be `Send + Sync`: the pump task and any number of
/// consumer tasks call into the engine concurrently. Calls that receive a
/// handle that was already released must not crash.
///
/// # Object Safety
/// The trait is object-safe and is stored as `Arc<dyn Engine>`.
pub trait Engine: Send + Sync + 'static {
    /// Start the engine. `0` means ready, anything else is fatal.
    fn init(&self) -> i32;

    /// Open a Chzzk chat stream. `> 0` is a session handle, `< 0` a failure.
    fn connect_chzzk(&self, url: &str) -> NativeHandle;

    /// Open a Soop chat stream. `> 0` is a session handle, `< 0` a failure.
    fn connect_soop(&self, url: &str) -> NativeHandle;

    /// Fetch the next message: `0` none yet, `> 0` a message handle now
    /// owned by the caller, `< 0` invalid session or fatal stream error.
    fn poll_next(&self, session: NativeHandle) -> NativeHandle;

    /// Close a stream.
    fn release_stream(&self, session: NativeHandle) -> i32;

    fn sender(&self, message: NativeHandle) -> String;

    /// Message text; `None` for donation-only events.
    fn content(&self, message: NativeHandle) -> Option<String>;

    /// Donated amount, `0` when the event carries no donation.
    fn donation(&self, message: NativeHandle) -> u64;

    fn has_donation(&self, message: NativeHandle) -> bool;

    /// Free a message.
    fn release_message(&self, message: NativeHandle) -> i32;
}
