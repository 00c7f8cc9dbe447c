//! Scripted engine shared by the integration tests.
//!
//! Every poll consumes the next script step once it is due. Steps are timed
//! relative to the connect call using Tokio's clock, so tests running with
//! a paused clock see deterministic arrival times.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use monochat_core::{Engine, Message, NativeHandle, StreamSession};
use tokio::time::Instant;

pub enum Step {
    Message { id: i64, at: Duration, message: Message },
    Fail(i64),
    Panic,
    /// Block the polling thread, then report nothing ready.
    Block(Duration),
}

pub struct ScriptedEngine {
    init_status: i32,
    connect_result: i64,
    script: Mutex<VecDeque<Step>>,
    connected_at: Mutex<Option<Instant>>,
    messages: Mutex<HashMap<i64, Message>>,
    released_messages: Mutex<Vec<i64>>,
    stream_released: AtomicBool,
    stream_releases: AtomicUsize,
    polls: AtomicUsize,
    polls_after_release: AtomicUsize,
    connects: AtomicUsize,
    inits: AtomicUsize,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            init_status: 0,
            connect_result: 42,
            script: Mutex::new(VecDeque::new()),
            connected_at: Mutex::new(None),
            messages: Mutex::new(HashMap::new()),
            released_messages: Mutex::new(Vec::new()),
            stream_released: AtomicBool::new(false),
            stream_releases: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            polls_after_release: AtomicUsize::new(0),
            connects: AtomicUsize::new(0),
            inits: AtomicUsize::new(0),
        }
    }

    pub fn with_init(mut self, status: i32) -> Self {
        self.init_status = status;
        self
    }

    pub fn with_connect(mut self, handle: i64) -> Self {
        self.connect_result = handle;
        self
    }

    pub fn message(self, id: i64, message: Message) -> Self {
        self.message_at(id, Duration::ZERO, message)
    }

    pub fn message_at(self, id: i64, at: Duration, message: Message) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Step::Message { id, at, message });
        self
    }

    pub fn fail(self, code: i64) -> Self {
        self.script.lock().unwrap().push_back(Step::Fail(code));
        self
    }

    pub fn block(self, duration: Duration) -> Self {
        self.script.lock().unwrap().push_back(Step::Block(duration));
        self
    }

    pub fn panic(self) -> Self {
        self.script.lock().unwrap().push_back(Step::Panic);
        self
    }

    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn stream_releases(&self) -> usize {
        self.stream_releases.load(Ordering::SeqCst)
    }

    pub fn released_messages(&self) -> Vec<i64> {
        let mut ids = self.released_messages.lock().unwrap().clone();
        ids.sort_unstable();
        ids
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn polls_after_release(&self) -> usize {
        self.polls_after_release.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn inits(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }

    fn connect(&self) -> NativeHandle {
        self.connects.fetch_add(1, Ordering::SeqCst);
        *self.connected_at.lock().unwrap() = Some(Instant::now());
        NativeHandle(self.connect_result)
    }

    fn get(&self, h: NativeHandle) -> Option<Message> {
        self.messages.lock().unwrap().get(&h.raw()).cloned()
    }
}

impl Engine for ScriptedEngine {
    fn init(&self) -> i32 {
        self.inits.fetch_add(1, Ordering::SeqCst);
        self.init_status
    }

    fn connect_chzzk(&self, _url: &str) -> NativeHandle {
        self.connect()
    }

    fn connect_soop(&self, _url: &str) -> NativeHandle {
        self.connect()
    }

    fn poll_next(&self, session: NativeHandle) -> NativeHandle {
        self.polls.fetch_add(1, Ordering::SeqCst);
        if session.raw() != self.connect_result || self.stream_released.load(Ordering::SeqCst) {
            self.polls_after_release.fetch_add(1, Ordering::SeqCst);
            return NativeHandle(-1);
        }
        let elapsed = self
            .connected_at
            .lock()
            .unwrap()
            .map(|t| t.elapsed())
            .unwrap_or_default();

        let mut script = self.script.lock().unwrap();
        let due = match script.front() {
            None => false,
            Some(Step::Message { at, .. }) => *at <= elapsed,
            Some(_) => true,
        };
        if !due {
            return NativeHandle::NONE;
        }
        match script.pop_front() {
            Some(Step::Message { id, message, .. }) => {
                self.messages.lock().unwrap().insert(id, message);
                NativeHandle(id)
            }
            Some(Step::Fail(code)) => NativeHandle(code),
            Some(Step::Panic) => {
                drop(script);
                panic!("scripted engine panic");
            }
            Some(Step::Block(duration)) => {
                drop(script);
                std::thread::sleep(duration);
                NativeHandle::NONE
            }
            None => NativeHandle::NONE,
        }
    }

    fn release_stream(&self, _session: NativeHandle) -> i32 {
        self.stream_released.store(true, Ordering::SeqCst);
        self.stream_releases.fetch_add(1, Ordering::SeqCst);
        0
    }

    fn sender(&self, h: NativeHandle) -> String {
        self.get(h).map(|m| m.sender).unwrap_or_default()
    }

    fn content(&self, h: NativeHandle) -> Option<String> {
        self.get(h).and_then(|m| m.content)
    }

    fn donation(&self, h: NativeHandle) -> u64 {
        self.get(h).and_then(|m| m.donated).unwrap_or(0)
    }

    fn has_donation(&self, h: NativeHandle) -> bool {
        self.get(h).map(|m| m.donated.is_some()).unwrap_or(false)
    }

    fn release_message(&self, h: NativeHandle) -> i32 {
        self.messages.lock().unwrap().remove(&h.raw());
        self.released_messages.lock().unwrap().push(h.raw());
        0
    }
}

/// Poll until the session has buffered `n` messages.
pub async fn wait_buffered(session: &StreamSession, n: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while session.buffered_count() < n {
        assert!(Instant::now() < deadline, "timed out waiting for {n} buffered messages");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Wait until the engine has been polled at least `n` times.
pub async fn wait_polls(engine: &ScriptedEngine, n: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while engine.polls() < n {
        assert!(Instant::now() < deadline, "timed out waiting for {n} polls");
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

/// Poll until the session reports closed.
pub async fn wait_closed(session: &StreamSession) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !session.is_closed() {
        assert!(Instant::now() < deadline, "timed out waiting for session close");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub fn chat(sender: &str, content: &str) -> Message {
    Message::chat(sender, content)
}
