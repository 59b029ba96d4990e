//! The process-wide backend handle.

use super::{BackendMode, DegradedBackend, KvBackend, RedisBackend};
use crate::error::BackendError;
use crate::metrics;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tenantkv_config::RedisConfig;
use tokio::sync::Mutex;

/// Opens the live connection for a [`BackendHandle`].
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &RedisConfig) -> Result<Arc<dyn KvBackend>, BackendError>;
}

/// Connects to Redis at `config.url`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RedisConnector;

#[async_trait]
impl Connector for RedisConnector {
    async fn connect(&self, config: &RedisConfig) -> Result<Arc<dyn KvBackend>, BackendError> {
        Ok(Arc::new(RedisBackend::connect(config).await?))
    }
}

enum State {
    Pending,
    Live(Arc<dyn KvBackend>),
    Degraded(String),
    Closed,
}

impl State {
    fn settled_mode(&self) -> Option<BackendMode> {
        match self {
            State::Pending => None,
            State::Live(_) => Some(BackendMode::Live),
            State::Degraded(_) | State::Closed => Some(BackendMode::Degraded),
        }
    }
}

/// Shared handle to the key-value store.
///
/// Create one per process, wrap it in an `Arc` and hand it to the cache
/// orchestrator and the rate-limit store. The first [`connect`](Self::connect)
/// decides the mode for the lifetime of the handle: a failed or timed-out
/// handshake degrades it permanently, and later calls return the memoized
/// outcome without dialing again.
///
/// Reads of the current backend are lock-free; only `connect` and `shutdown`
/// serialize on an internal mutex.
pub struct BackendHandle {
    config: RedisConfig,
    connector: Arc<dyn Connector>,
    state: ArcSwap<State>,
    transition: Mutex<()>,
    degraded: Arc<dyn KvBackend>,
}

impl BackendHandle {
    /// Create an unconnected handle that will dial Redis.
    pub fn new(config: RedisConfig) -> Self {
        Self::with_connector(config, Arc::new(RedisConnector))
    }

    /// Create an unconnected handle using a custom connector.
    pub fn with_connector(config: RedisConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            state: ArcSwap::from_pointee(State::Pending),
            transition: Mutex::new(()),
            degraded: Arc::new(DegradedBackend),
        }
    }

    /// Create a handle and connect it.
    pub async fn init(config: RedisConfig) -> Self {
        let handle = Self::new(config);
        handle.connect().await;
        handle
    }

    /// Perform the one-time handshake and return the resulting mode.
    ///
    /// Never fails: an unreachable, slow or disabled backend yields
    /// [`BackendMode::Degraded`].
    pub async fn connect(&self) -> BackendMode {
        if let Some(mode) = self.state.load().settled_mode() {
            return mode;
        }

        let _guard = self.transition.lock().await;
        if let Some(mode) = self.state.load().settled_mode() {
            return mode;
        }

        let next = self.handshake().await;
        match &next {
            State::Live(_) => {
                tracing::info!(url = %self.config.url, "✓ Connected to key-value backend");
            }
            State::Degraded(reason) => {
                tracing::warn!(
                    url = %self.config.url,
                    reason = %reason,
                    "Key-value backend unavailable. Running degraded until restart."
                );
            }
            State::Pending | State::Closed => {}
        }

        let mode = next.settled_mode().unwrap_or(BackendMode::Degraded);
        metrics::set_backend_live(mode == BackendMode::Live);
        self.state.store(Arc::new(next));
        mode
    }

    async fn handshake(&self) -> State {
        if self.config.disabled {
            return State::Degraded(BackendError::Disabled.to_string());
        }

        let timeout = self.config.connect_timeout();
        match tokio::time::timeout(timeout, self.connector.connect(&self.config)).await {
            Ok(Ok(backend)) => State::Live(backend),
            Ok(Err(e)) => State::Degraded(e.to_string()),
            Err(_) => State::Degraded(BackendError::ConnectTimeout(timeout).to_string()),
        }
    }

    /// The backend selected by `connect`, or the degraded stand-in when the
    /// handle is not (or no longer) live.
    pub fn backend(&self) -> Arc<dyn KvBackend> {
        match &**self.state.load() {
            State::Live(backend) => Arc::clone(backend),
            _ => Arc::clone(&self.degraded),
        }
    }

    pub fn mode(&self) -> BackendMode {
        self.state
            .load()
            .settled_mode()
            .unwrap_or(BackendMode::Degraded)
    }

    pub fn is_live(&self) -> bool {
        self.mode() == BackendMode::Live
    }

    /// Why the handle is degraded, if it is.
    pub fn degraded_reason(&self) -> Option<String> {
        match &**self.state.load() {
            State::Pending => Some("not connected".to_string()),
            State::Live(_) => None,
            State::Degraded(reason) => Some(reason.clone()),
            State::Closed => Some(BackendError::Closed.to_string()),
        }
    }

    /// Release the connection. Callers holding a backend obtained earlier keep
    /// it until they drop it; new operations see the degraded stand-in.
    pub async fn shutdown(&self) {
        let _guard = self.transition.lock().await;
        let previous = self.state.swap(Arc::new(State::Closed));
        match &*previous {
            State::Closed => return,
            State::Live(_) => tracing::info!("Closing key-value backend connection"),
            State::Pending | State::Degraded(_) => {
                tracing::debug!("Backend handle shut down")
            }
        }
        metrics::set_backend_live(false);
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }
}

impl fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendHandle")
            .field("url", &self.config.url)
            .field("mode", &self.mode())
            .finish_non_exhaustive()
    }
}
