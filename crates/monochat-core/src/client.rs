//! Connection factory and process-wide bootstrap.

use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tracing::{error, info};

use crate::config::SessionConfig;
use crate::engine::{Engine, Platform};
use crate::error::MonoChatError;
use crate::session::StreamSession;

static GLOBAL: OnceLock<MonoChat> = OnceLock::new();
static INSTALL_LOCK: Mutex<()> = Mutex::new(());

/// An initialized engine plus the session settings applied to every
/// connection it opens.
#[derive(Clone)]
pub struct MonoChat {
    engine: Arc<dyn Engine>,
    config: SessionConfig,
}

impl MonoChat {
    /// Initialize `engine` with default session settings.
    pub fn new(engine: Arc<dyn Engine>) -> Result<Self, MonoChatError> {
        Self::with_config(engine, SessionConfig::default())
    }

    /// Initialize `engine`. A nonzero `init` status is fatal.
    pub fn with_config(engine: Arc<dyn Engine>, config: SessionConfig) -> Result<Self, MonoChatError> {
        let status = engine.init();
        if status != 0 {
            error!(status, "engine failed to initialize");
            return Err(MonoChatError::Initialization { status });
        }
        Ok(Self { engine, config })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Connect to `url` on `platform`.
    ///
    /// Returns `Ok(None)` when the engine could not connect; that is an
    /// expected outcome, not an error. On success the session's pump is
    /// already running. Must be called from within a Tokio runtime.
    pub fn connect(
        &self,
        platform: Platform,
        url: &str,
    ) -> Result<Option<StreamSession>, MonoChatError> {
        if url.trim().is_empty() {
            return Err(MonoChatError::EmptyUrl);
        }
        tokio::runtime::Handle::try_current().map_err(|_| MonoChatError::NoRuntime)?;

        let handle = match platform {
            Platform::Chzzk => self.engine.connect_chzzk(url),
            Platform::Soop => self.engine.connect_soop(url),
        };
        if !handle.is_valid() {
            info!(platform = %platform, code = handle.raw(), "connect failed");
            return Ok(None);
        }

        StreamSession::open(Arc::clone(&self.engine), platform, handle, self.config.clone())
            .map(Some)
    }

    pub fn connect_chzzk(&self, url: &str) -> Result<Option<StreamSession>, MonoChatError> {
        self.connect(Platform::Chzzk, url)
    }

    pub fn connect_soop(&self, url: &str) -> Result<Option<StreamSession>, MonoChatError> {
        self.connect(Platform::Soop, url)
    }
}

impl std::fmt::Debug for MonoChat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonoChat").field("config", &self.config).finish()
    }
}

/// Bootstrap the process-wide client.
///
/// `init` runs exactly once per process on success. Once installed, later
/// calls return the existing client and ignore their arguments. A failed
/// install leaves nothing behind and may be retried.
pub fn install(
    engine: Arc<dyn Engine>,
    config: SessionConfig,
) -> Result<&'static MonoChat, MonoChatError> {
    if let Some(client) = GLOBAL.get() {
        return Ok(client);
    }
    let _serial = INSTALL_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(client) = GLOBAL.get() {
        return Ok(client);
    }
    let client = MonoChat::with_config(engine, config)?;
    Ok(GLOBAL.get_or_init(|| client))
}

/// The process-wide client, if [`install`] has succeeded.
pub fn global() -> Result<&'static MonoChat, MonoChatError> {
    GLOBAL.get().ok_or(MonoChatError::NotInitialized)
}

/// Connect through the process-wide client; fails fast before [`install`].
pub fn connect(platform: Platform, url: &str) -> Result<Option<StreamSession>, MonoChatError> {
    global()?.connect(platform, url)
}
