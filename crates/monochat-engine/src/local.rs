//! `LocalEngine`: handle-table engine running feeds on a Tokio runtime.
//!
//! # Handle contract
//!
//! * Stream and message ids come from one counter and are always `> 0`.
//! * `poll_next` returns `0` whenever nothing is ready, including after the
//!   feed has ended or failed to open, and `-1` only for unknown or released
//!   streams. An ended stream stays registered until `release_stream`.
//! * Accessors on unknown message ids return empty values; release calls on
//!   unknown ids return `-1` and do nothing else.
//! * Panics are caught with [`std::panic::catch_unwind`] so they never cross
//!   the engine boundary.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use futures::StreamExt;
use monochat_core::{Engine, Message, NativeHandle, Platform};
use tokio::runtime::{Handle, Runtime};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::source::ChatSource;

const OK: i32 = 0;
const FAILED: i32 = -1;
const INVALID: NativeHandle = NativeHandle(-1);

// Runtime used when `init` is called outside any Tokio runtime.
static OWNED_RUNTIME: OnceLock<Runtime> = OnceLock::new();

fn owned_runtime() -> Option<&'static Runtime> {
    if let Some(rt) = OWNED_RUNTIME.get() {
        return Some(rt);
    }
    match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("monochat-engine")
        .build()
    {
        Ok(rt) => Some(OWNED_RUNTIME.get_or_init(|| rt)),
        Err(e) => {
            warn!(error = %e, "failed to build engine runtime");
            None
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run `f`, turning a panic into `fallback`.
fn guarded<T>(what: &str, fallback: T, f: impl FnOnce() -> T) -> T {
    std::panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|_| {
        warn!("panic during {what}");
        fallback
    })
}

struct StreamSlot {
    platform: Platform,
    rx: mpsc::UnboundedReceiver<Message>,
    stop: Option<oneshot::Sender<()>>,
}

/// In-process [`Engine`] backed by registered [`ChatSource`]s.
pub struct LocalEngine {
    sources: HashMap<Platform, Arc<dyn ChatSource>>,
    runtime: OnceLock<Handle>,
    streams: Mutex<HashMap<i64, StreamSlot>>,
    messages: Mutex<HashMap<i64, Message>>,
    next_id: AtomicI64,
}

impl Default for LocalEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalEngine {
    /// An engine with no sources; every connect fails until one is added.
    pub fn new() -> Self {
        Self {
            sources: HashMap::new(),
            runtime: OnceLock::new(),
            streams: Mutex::new(HashMap::new()),
            messages: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Register the feed source for `platform`, replacing any previous one.
    pub fn with_source(mut self, platform: Platform, source: Arc<dyn ChatSource>) -> Self {
        self.sources.insert(platform, source);
        self
    }

    /// Number of open streams.
    pub fn stream_count(&self) -> usize {
        lock(&self.streams).len()
    }

    /// Number of messages handed out and not yet released.
    pub fn live_message_count(&self) -> usize {
        lock(&self.messages).len()
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn message<T>(&self, h: NativeHandle, f: impl FnOnce(&Message) -> T) -> Option<T> {
        lock(&self.messages).get(&h.raw()).map(f)
    }

    fn open(&self, platform: Platform, url: &str) -> NativeHandle {
        let Some(runtime) = self.runtime.get() else {
            warn!(platform = %platform, "connect before init");
            return INVALID;
        };
        if url.trim().is_empty() {
            return INVALID;
        }
        let Some(source) = self.sources.get(&platform).cloned() else {
            warn!(platform = %platform, "no source registered");
            return INVALID;
        };

        let id = self.next_id();
        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        // Registered before the task starts so an early poll finds the slot.
        lock(&self.streams).insert(
            id,
            StreamSlot {
                platform,
                rx,
                stop: Some(stop_tx),
            },
        );
        runtime.spawn(forward(id, url.to_string(), source, tx, stop_rx));

        info!(stream = id, platform = %platform, "stream connecting");
        NativeHandle(id)
    }
}

/// Copy a feed into the stream's channel until it ends or is stopped.
async fn forward(
    id: i64,
    url: String,
    source: Arc<dyn ChatSource>,
    tx: mpsc::UnboundedSender<Message>,
    mut stop: oneshot::Receiver<()>,
) {
    let mut feed = tokio::select! {
        opened = source.open(&url) => match opened {
            Ok(feed) => feed,
            Err(e) => {
                warn!(stream = id, source = source.name(), error = %e, "feed failed to open");
                return;
            }
        },
        _ = &mut stop => return,
    };

    loop {
        tokio::select! {
            item = feed.next() => match item {
                Some(message) => {
                    if tx.send(message).is_err() {
                        break;
                    }
                }
                None => {
                    debug!(stream = id, "feed ended");
                    break;
                }
            },
            _ = &mut stop => break,
        }
    }
}

impl Engine for LocalEngine {
    fn init(&self) -> i32 {
        guarded("init", FAILED, || {
            if self.runtime.get().is_some() {
                return OK;
            }
            let handle = match Handle::try_current() {
                Ok(handle) => handle,
                Err(_) => match owned_runtime() {
                    Some(rt) => rt.handle().clone(),
                    None => return FAILED,
                },
            };
            let _ = self.runtime.set(handle);
            OK
        })
    }

    fn connect_chzzk(&self, url: &str) -> NativeHandle {
        guarded("connect_chzzk", INVALID, || self.open(Platform::Chzzk, url))
    }

    fn connect_soop(&self, url: &str) -> NativeHandle {
        guarded("connect_soop", INVALID, || self.open(Platform::Soop, url))
    }

    fn poll_next(&self, session: NativeHandle) -> NativeHandle {
        guarded("poll_next", INVALID, || {
            let polled = {
                let mut streams = lock(&self.streams);
                let Some(slot) = streams.get_mut(&session.raw()) else {
                    return INVALID;
                };
                slot.rx.try_recv()
            };
            match polled {
                Ok(message) => {
                    let id = self.next_id();
                    lock(&self.messages).insert(id, message);
                    NativeHandle(id)
                }
                Err(_) => NativeHandle::NONE,
            }
        })
    }

    fn release_stream(&self, session: NativeHandle) -> i32 {
        guarded("release_stream", FAILED, || {
            let Some(mut slot) = lock(&self.streams).remove(&session.raw()) else {
                return FAILED;
            };
            if let Some(stop) = slot.stop.take() {
                let _ = stop.send(());
            }
            info!(stream = session.raw(), platform = %slot.platform, "stream released");
            OK
        })
    }

    fn sender(&self, message: NativeHandle) -> String {
        guarded("sender", String::new(), || {
            self.message(message, |m| m.sender.clone()).unwrap_or_default()
        })
    }

    fn content(&self, message: NativeHandle) -> Option<String> {
        guarded("content", None, || {
            self.message(message, |m| m.content.clone()).flatten()
        })
    }

    fn donation(&self, message: NativeHandle) -> u64 {
        guarded("donation", 0, || {
            self.message(message, |m| m.donated.unwrap_or(0)).unwrap_or(0)
        })
    }

    fn has_donation(&self, message: NativeHandle) -> bool {
        guarded("has_donation", false, || {
            self.message(message, |m| m.donated.is_some()).unwrap_or(false)
        })
    }

    fn release_message(&self, message: NativeHandle) -> i32 {
        guarded("release_message", FAILED, || {
            match lock(&self.messages).remove(&message.raw()) {
                Some(_) => OK,
                None => FAILED,
            }
        })
    }
}

impl std::fmt::Debug for LocalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalEngine")
            .field("platforms", &self.sources.keys().collect::<Vec<_>>())
            .field("streams", &self.stream_count())
            .field("messages", &self.live_message_count())
            .finish()
    }
}
