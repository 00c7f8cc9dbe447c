//! Opaque engine handles.

use std::fmt;

/// Opaque integer token referencing an engine-owned resource.
///
/// `0` is the none/invalid sentinel, negative values are errors and
/// positive values are live resources. The value is never interpreted
/// beyond its sign; it is only passed back to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeHandle(pub i64);

impl NativeHandle {
    /// The none/invalid sentinel.
    pub const NONE: Self = Self(0);

    pub fn raw(self) -> i64 {
        self.0
    }

    /// Returns `true` for a live resource (`> 0`).
    pub fn is_valid(self) -> bool {
        self.0 > 0
    }

    /// Returns `true` for an engine-reported error (`< 0`).
    pub fn is_error(self) -> bool {
        self.0 < 0
    }

    /// Returns `true` for the none sentinel.
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl From<i64> for NativeHandle {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Classified result of one `Engine::poll_next` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// A message is ready; the handle is owned by the caller from now on.
    Ready(NativeHandle),
    /// Nothing is ready yet.
    Empty,
    /// The session handle is invalid or the stream failed.
    Invalid(NativeHandle),
}

impl From<NativeHandle> for PollOutcome {
    fn from(handle: NativeHandle) -> Self {
        match handle.0 {
            0 => Self::Empty,
            n if n > 0 => Self::Ready(handle),
            _ => Self::Invalid(handle),
        }
    }
}
