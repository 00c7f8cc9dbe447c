//! Decoded chat events.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::error::MonoChatError;
use crate::guard::ResourceGuard;
use crate::handle::NativeHandle;

/// An owned, engine-independent copy of one chat event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub donated: Option<u64>,
}

impl Message {
    pub fn chat(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            content: Some(content.into()),
            donated: None,
        }
    }

    pub fn donation(sender: impl Into<String>, amount: u64, content: Option<String>) -> Self {
        Self {
            sender: sender.into(),
            content,
            donated: Some(amount),
        }
    }
}

/// One decoded chat or donation event backed by an engine handle.
///
/// Fields are not cached: every accessor queries the engine while the
/// message is owned and fails with [`MonoChatError::UseAfterRelease`] once
/// it has been released. The handle is released exactly once, by
/// [`free`](Self::free), by the owning session's close, or on drop.
pub struct ChatMessage {
    engine: Arc<dyn Engine>,
    guard: ResourceGuard,
}

impl ChatMessage {
    /// Take ownership of a message handle returned by `poll_next`.
    pub fn new(engine: Arc<dyn Engine>, handle: NativeHandle) -> Self {
        let releaser = Arc::clone(&engine);
        let guard = ResourceGuard::new(handle, move |h| {
            let _ = releaser.release_message(h);
            tracing::trace!(message = %h, "message released");
        });
        Self { engine, guard }
    }

    fn live(&self) -> Result<NativeHandle, MonoChatError> {
        self.guard
            .handle()
            .ok_or(MonoChatError::UseAfterRelease { resource: "message" })
    }

    /// The engine handle, or `None` once released.
    pub fn handle(&self) -> Option<NativeHandle> {
        self.guard.handle()
    }

    pub fn sender(&self) -> Result<String, MonoChatError> {
        let h = self.live()?;
        Ok(self.engine.sender(h))
    }

    /// Message text; `None` for donation-only events.
    pub fn content(&self) -> Result<Option<String>, MonoChatError> {
        let h = self.live()?;
        Ok(self.engine.content(h))
    }

    pub fn has_content(&self) -> Result<bool, MonoChatError> {
        Ok(self.content()?.is_some())
    }

    /// Donated amount, `0` when there is none.
    pub fn donation_amount(&self) -> Result<u64, MonoChatError> {
        let h = self.live()?;
        Ok(self.engine.donation(h))
    }

    pub fn has_donation(&self) -> Result<bool, MonoChatError> {
        let h = self.live()?;
        Ok(self.engine.has_donation(h))
    }

    /// Copy every field out of the engine.
    pub fn to_message(&self) -> Result<Message, MonoChatError> {
        let donated = if self.has_donation()? {
            Some(self.donation_amount()?)
        } else {
            None
        };
        Ok(Message {
            sender: self.sender()?,
            content: self.content()?,
            donated,
        })
    }

    /// Release the engine handle. Later calls are no-ops.
    pub fn free(&self) {
        self.guard.release();
    }

    pub fn is_freed(&self) -> bool {
        self.guard.is_released()
    }
}

impl fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // A concurrent free() between accessors also renders as freed.
        match self.to_message() {
            Err(_) => f.write_str("Message[freed]"),
            Ok(m) => {
                write!(f, "Message[sender={}", m.sender)?;
                if let Some(content) = &m.content {
                    write!(f, ", content='{content}'")?;
                }
                if let Some(amount) = m.donated {
                    write!(f, ", donated={amount}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl fmt::Debug for ChatMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
