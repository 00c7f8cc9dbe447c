//! `StreamSession`: one live connection, its pump task and message buffer.
//!
//! Lifecycle: `Connecting → Open → Closing → Closed`, monotonic.
//!
//! - The pump is a single Tokio task per session. It polls the engine,
//!   wraps every ready handle in a [`ChatMessage`] and pushes it onto an
//!   unbounded FIFO. When nothing is ready it sleeps for the configured
//!   backoff. A negative poll result or a panic inside the pump closes the
//!   session from the pump side.
//! - Consumers pop from the FIFO with [`take`](StreamSession::take),
//!   [`timed_take`](StreamSession::timed_take),
//!   [`try_take`](StreamSession::try_take) or
//!   [`messages`](StreamSession::messages). The pump never waits on a
//!   consumer: pushing onto the channel takes no lock.
//! - [`close`](StreamSession::close) is idempotent and first-wins. It sets
//!   the closed flag, releases the session handle, stops the pump (bounded
//!   wait) and releases every message still in the buffer.

use std::future::{self, Future};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use futures::{FutureExt, Stream};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::engine::{Engine, Platform};
use crate::error::MonoChatError;
use crate::guard::ResourceGuard;
use crate::handle::{NativeHandle, PollOutcome};
use crate::message::ChatMessage;

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// `close()` was called.
    Requested,
    /// The engine reported an invalid handle while polling.
    InvalidHandle,
    /// The pump panicked; the panic was contained.
    PumpPanicked,
    /// The session was dropped without being closed.
    Dropped,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Requested => write!(f, "requested"),
            Self::InvalidHandle => write!(f, "invalid handle"),
            Self::PumpPanicked => write!(f, "pump panicked"),
            Self::Dropped => write!(f, "dropped"),
        }
    }
}

/// Counter snapshot for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Messages obtained from the engine.
    pub received: u64,
    /// Messages handed to consumers.
    pub delivered: u64,
    /// Messages released by the session during or after close.
    pub dropped_on_close: u64,
    /// Polls that found nothing ready.
    pub empty_polls: u64,
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    delivered: AtomicU64,
    dropped_on_close: AtomicU64,
    empty_polls: AtomicU64,
}

/// State shared between the session, its pump and its consumers.
struct Shared {
    engine: Arc<dyn Engine>,
    guard: ResourceGuard,
    config: SessionConfig,
    closed: AtomicBool,
    closed_tx: watch::Sender<bool>,
    drained_tx: watch::Sender<bool>,
    close_reason: OnceLock<CloseReason>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<ChatMessage>>,
    buffered: AtomicUsize,
    counters: Counters,
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closed-flag transition plus session-handle release. Only the first
    /// caller gets `true`.
    fn begin_close(&self, reason: CloseReason) -> bool {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let _ = self.close_reason.set(reason);
        self.closed_tx.send_replace(true);
        self.guard.release();
        true
    }

    fn drain_locked(&self, rx: &mut mpsc::UnboundedReceiver<ChatMessage>) -> usize {
        rx.close();
        let mut drained = 0;
        while let Ok(message) = rx.try_recv() {
            self.buffered.fetch_sub(1, Ordering::AcqRel);
            message.free();
            drained += 1;
        }
        self.counters
            .dropped_on_close
            .fetch_add(drained as u64, Ordering::Relaxed);
        drained
    }

    /// Release everything still buffered and publish the drained flag.
    async fn drain(&self) -> usize {
        let drained = {
            let mut rx = self.rx.lock().await;
            self.drain_locked(&mut rx)
        };
        self.drained_tx.send_replace(true);
        drained
    }

    /// Close path for callers that lost the `begin_close` race: wait for the
    /// winner's drain, bounded, then sweep whatever is left.
    async fn await_drained(&self) {
        let drained = self.drained_tx.subscribe();
        let limit = self.config.close_timeout();
        if tokio::time::timeout(limit, raised(drained)).await.is_err() {
            debug!("close still in progress after {limit:?}, draining");
        }
        self.drain().await;
    }

    /// Close from inside the pump.
    async fn shutdown(&self, reason: CloseReason) {
        if self.begin_close(reason) {
            let drained = self.drain().await;
            info!(reason = %reason, drained, "session closed by pump");
        }
    }

    fn delivered(&self, message: ChatMessage) -> ChatMessage {
        self.buffered.fetch_sub(1, Ordering::AcqRel);
        self.counters.delivered.fetch_add(1, Ordering::Relaxed);
        message
    }

    fn discard(&self, message: ChatMessage) {
        message.free();
        self.counters.dropped_on_close.fetch_add(1, Ordering::Relaxed);
    }
}

/// One active connection to a chat stream.
///
/// Share it between tasks with `Arc<StreamSession>`; every method takes
/// `&self`. Dropping an open session closes it without waiting for the
/// pump.
pub struct StreamSession {
    id: NativeHandle,
    platform: Platform,
    shared: Arc<Shared>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl StreamSession {
    /// Wrap a freshly connected session handle and start its pump.
    ///
    /// Must be called from within a Tokio runtime. On error the handle has
    /// already been released.
    pub(crate) fn open(
        engine: Arc<dyn Engine>,
        platform: Platform,
        handle: NativeHandle,
        config: SessionConfig,
    ) -> Result<Self, MonoChatError> {
        let releaser = Arc::clone(&engine);
        let guard = ResourceGuard::new(handle, move |h| {
            let _ = releaser.release_stream(h);
            debug!(session = %h, "stream released");
        });
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| MonoChatError::NoRuntime)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let (closed_tx, _) = watch::channel(false);
        let (drained_tx, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            engine,
            guard,
            config,
            closed: AtomicBool::new(false),
            closed_tx,
            drained_tx,
            close_reason: OnceLock::new(),
            rx: tokio::sync::Mutex::new(rx),
            buffered: AtomicUsize::new(0),
            counters: Counters::default(),
        });

        let pump_shared = Arc::clone(&shared);
        let task = runtime.spawn(async move {
            let outcome = AssertUnwindSafe(pump(Arc::clone(&pump_shared), tx))
                .catch_unwind()
                .await;
            if outcome.is_err() {
                error!(session = %handle, "pump panicked, closing session");
                pump_shared.shutdown(CloseReason::PumpPanicked).await;
            }
        });

        info!(session = %handle, platform = %platform, "session open");
        Ok(Self {
            id: handle,
            platform,
            shared,
            pump: Mutex::new(Some(task)),
        })
    }

    /// The session handle this session was opened with.
    pub fn handle(&self) -> NativeHandle {
        self.id
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Why the session closed, `None` while it is open.
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.shared.close_reason.get().copied()
    }

    /// Number of messages waiting in the buffer.
    ///
    /// Consistent, but the pump may push concurrently.
    pub fn buffered_count(&self) -> usize {
        self.shared.buffered.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> SessionStats {
        let c = &self.shared.counters;
        SessionStats {
            received: c.received.load(Ordering::Relaxed),
            delivered: c.delivered.load(Ordering::Relaxed),
            dropped_on_close: c.dropped_on_close.load(Ordering::Relaxed),
            empty_polls: c.empty_polls.load(Ordering::Relaxed),
        }
    }

    /// Wait for the next message.
    ///
    /// Returns `Ok(None)` once the session is closed.
    pub async fn take(&self) -> Result<Option<ChatMessage>, MonoChatError> {
        self.take_until(future::pending::<()>()).await
    }

    /// Wait for the next message unless `cancel` completes first, in which
    /// case [`MonoChatError::Cancelled`] is returned and the session is
    /// left untouched.
    pub async fn take_until<F>(&self, cancel: F) -> Result<Option<ChatMessage>, MonoChatError>
    where
        F: Future<Output = ()>,
    {
        if self.is_closed() {
            return Ok(None);
        }
        tokio::select! {
            biased;
            _ = cancel => Err(MonoChatError::Cancelled),
            taken = self.recv() => Ok(taken),
        }
    }

    /// Wait at most `timeout` for the next message.
    pub async fn timed_take(&self, timeout: Duration) -> Option<ChatMessage> {
        if self.is_closed() {
            return None;
        }
        tokio::time::timeout(timeout, self.recv())
            .await
            .ok()
            .flatten()
    }

    /// Pop a message if one is buffered right now; never waits.
    pub fn try_take(&self) -> Option<ChatMessage> {
        if self.is_closed() {
            return None;
        }
        // A consumer holding the receiver is parked on an empty buffer.
        let mut rx = self.shared.rx.try_lock().ok()?;
        rx.try_recv().ok().map(|m| self.shared.delivered(m))
    }

    /// Messages as a stream. Each item waits like [`take`](Self::take);
    /// the stream ends once the session is closed. A new call starts from
    /// whatever is still buffered.
    pub fn messages(&self) -> impl Stream<Item = ChatMessage> + '_ {
        futures::stream::unfold(self, |session| async move {
            match session.take().await {
                Ok(Some(message)) => Some((message, session)),
                _ => None,
            }
        })
    }

    /// Close the session. Idempotent and first-wins: later or concurrent
    /// callers do not repeat the release but still return only once the
    /// buffer has been drained, or the close timeout has passed.
    pub async fn close(&self) {
        if !self.shared.begin_close(CloseReason::Requested) {
            self.shared.await_drained().await;
            return;
        }

        let task = self
            .pump
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
            let limit = self.shared.config.close_timeout();
            if tokio::time::timeout(limit, task).await.is_err() {
                warn!(session = %self.id, "pump did not stop within {limit:?}");
            }
        }

        let drained = self.shared.drain().await;
        info!(session = %self.id, drained, "session closed");
    }

    async fn recv(&self) -> Option<ChatMessage> {
        let closed = raised(self.shared.closed_tx.subscribe());
        tokio::pin!(closed);
        let mut rx = tokio::select! {
            rx = self.shared.rx.lock() => rx,
            _ = &mut closed => return None,
        };
        tokio::select! {
            biased;
            message = rx.recv() => message.map(|m| self.shared.delivered(m)),
            _ = &mut closed => None,
        }
    }
}

/// Completes once `flag` has been set.
async fn raised(mut flag: watch::Receiver<bool>) {
    loop {
        let is_set = *flag.borrow_and_update();
        if is_set || flag.changed().await.is_err() {
            return;
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        if !self.shared.begin_close(CloseReason::Dropped) {
            return;
        }
        if let Some(task) = self
            .pump
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        // If a consumer still holds the receiver, whatever it leaves behind
        // is released when the last reference to the buffer goes away.
        if let Ok(mut rx) = self.shared.rx.try_lock() {
            self.shared.drain_locked(&mut rx);
        }
        self.shared.drained_tx.send_replace(true);
        debug!(session = %self.id, "session dropped");
    }
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("handle", &self.id)
            .field("platform", &self.platform)
            .field("closed", &self.is_closed())
            .field("buffered", &self.buffered_count())
            .finish()
    }
}

/// Drain the engine into the buffer until the session closes.
async fn pump(shared: Arc<Shared>, tx: mpsc::UnboundedSender<ChatMessage>) {
    let backoff = shared.config.poll_backoff();

    while !shared.is_closed() {
        let Some(session) = shared.guard.handle() else {
            break;
        };

        match PollOutcome::from(shared.engine.poll_next(session)) {
            PollOutcome::Ready(handle) => {
                let message = ChatMessage::new(Arc::clone(&shared.engine), handle);
                shared.counters.received.fetch_add(1, Ordering::Relaxed);

                // Close may have landed while the engine was polled.
                if shared.is_closed() {
                    shared.discard(message);
                    break;
                }

                shared.buffered.fetch_add(1, Ordering::AcqRel);
                if let Err(mpsc::error::SendError(message)) = tx.send(message) {
                    shared.buffered.fetch_sub(1, Ordering::AcqRel);
                    shared.discard(message);
                    break;
                }
                debug!(session = %session, message = %handle, "message buffered");
                tokio::task::yield_now().await;
            }
            PollOutcome::Empty => {
                shared.counters.empty_polls.fetch_add(1, Ordering::Relaxed);
                tokio::time::sleep(backoff).await;
            }
            PollOutcome::Invalid(code) => {
                if !shared.is_closed() {
                    warn!(session = %session, code = code.raw(), "engine reported invalid handle");
                    shared.shutdown(CloseReason::InvalidHandle).await;
                }
                break;
            }
        }
    }
}
