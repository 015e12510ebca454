//! Store context and lifecycle
//!
//! A [`StoreContext`] owns the configuration and lazily builds the store the
//! first time it is needed. Resolution never fails: any problem with the
//! preferred backend is logged with its precise cause and the in-process
//! store is used instead. After [`StoreContext::close`] the next access
//! resolves again.

use crate::config::{BackendKind, StoreConfig};
use crate::error::{ConnectionCause, ConnectionError, StoreError};
use crate::local::LocalStore;
use crate::remote::RemoteStore;
use crate::store::{MemoryStore, Store};
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{error, info, warn};

/// Where a context is in its life
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Nothing resolved yet
    Uninitialized,
    /// Resolution in progress
    Resolving,
    /// The configured backend is in use
    Connected(BackendKind),
    /// The configured backend failed; the in-process store is in use
    Degraded,
    /// Closed explicitly; the next access resolves again
    Closed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Uninitialized => write!(f, "uninitialized"),
            LifecycleState::Resolving => write!(f, "resolving"),
            LifecycleState::Connected(kind) => write!(f, "connected ({})", kind),
            LifecycleState::Degraded => write!(f, "degraded (memory fallback)"),
            LifecycleState::Closed => write!(f, "closed"),
        }
    }
}

/// Owner of one lazily resolved store
pub struct StoreContext {
    config: StoreConfig,

    /// Resolved store; the async lock also serializes resolution
    slot: tokio::sync::Mutex<Option<Arc<Store>>>,

    state: Mutex<LifecycleState>,
}

impl StoreContext {
    pub fn new(config: StoreConfig) -> Self {
        StoreContext {
            config,
            slot: tokio::sync::Mutex::new(None),
            state: Mutex::new(LifecycleState::Uninitialized),
        }
    }

    pub fn from_env() -> Self {
        Self::new(StoreConfig::from_env())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// The store, resolving it on first use
    ///
    /// Concurrent first callers wait for one resolution and share its
    /// result.
    pub async fn get(&self) -> Arc<Store> {
        let mut slot = self.slot.lock().await;
        if let Some(store) = slot.as_ref() {
            return store.clone();
        }

        *self.state.lock() = LifecycleState::Resolving;
        let (store, state) = resolve(&self.config).await;
        *self.state.lock() = state;

        let store = Arc::new(store);
        *slot = Some(store.clone());
        store
    }

    /// Close the current store, if any
    ///
    /// Idempotent. Handles already given out keep working for remote and
    /// memory stores; a closed local store answers `Closed`.
    pub async fn close(&self) -> Result<(), StoreError> {
        let mut slot = self.slot.lock().await;
        let store = match slot.take() {
            Some(store) => store,
            None => return Ok(()),
        };
        *self.state.lock() = LifecycleState::Closed;
        store.close().await
    }
}

/// Build the store `config` asks for, falling back to memory on any failure
pub async fn resolve(config: &StoreConfig) -> (Store, LifecycleState) {
    match config.backend_kind() {
        BackendKind::Local => match LocalStore::connect(config).await {
            Ok(local) => {
                info!("Using local backend at {}", local.peer());
                (Store::Local(local), LifecycleState::Connected(BackendKind::Local))
            }
            Err(e) => {
                report_failure(BackendKind::Local, &e);
                degraded()
            }
        },
        BackendKind::Remote => match connect_remote(config).await {
            Ok(remote) => {
                info!("Using remote backend at {}", remote.url());
                (Store::Remote(remote), LifecycleState::Connected(BackendKind::Remote))
            }
            Err(e) => {
                report_failure(BackendKind::Remote, &e);
                degraded()
            }
        },
        BackendKind::Memory => {
            if let Some(missing) = config.partial_remote() {
                warn!("Remote backend is only partly configured: {} is not set", missing);
            }
            warn!("Using in-memory storage; chat history will not survive a restart");
            (
                Store::Memory(MemoryStore::new()),
                LifecycleState::Connected(BackendKind::Memory),
            )
        }
    }
}

async fn connect_remote(config: &StoreConfig) -> Result<RemoteStore, StoreError> {
    let (url, token) = config.remote_credentials().ok_or_else(|| {
        StoreError::Configuration("remote URL or token missing".to_string())
    })?;
    let remote = RemoteStore::new(url, token)?;
    if config.verify_remote {
        remote.ping().await?;
    }
    Ok(remote)
}

fn degraded() -> (Store, LifecycleState) {
    warn!("Falling back to in-memory storage; chat history will not survive a restart");
    (Store::Memory(MemoryStore::new()), LifecycleState::Degraded)
}

fn report_failure(kind: BackendKind, err: &StoreError) {
    match err {
        StoreError::Connection(e) => report_connection(kind, e),
        StoreError::Configuration(message) => {
            error!("The {} backend is misconfigured: {}", kind, message)
        }
        other => error!("The {} backend could not be initialized: {}", kind, other),
    }
}

fn report_connection(kind: BackendKind, err: &ConnectionError) {
    match err.cause {
        ConnectionCause::Refused => error!(
            "Connection to the {} backend at {} was refused; is the server running? ({})",
            kind, err.target, err.message
        ),
        ConnectionCause::Timeout => error!(
            "Connection to the {} backend at {} timed out ({})",
            kind, err.target, err.message
        ),
        ConnectionCause::HostNotFound => error!(
            "Host of the {} backend {} could not be resolved ({})",
            kind, err.target, err.message
        ),
        ConnectionCause::Unauthorized => error!(
            "The {} backend at {} rejected the credentials ({})",
            kind, err.target, err.message
        ),
        ConnectionCause::UrlNotFound => error!(
            "The {} backend URL {} was not found ({})",
            kind, err.target, err.message
        ),
        ConnectionCause::Other => error!(
            "Could not connect to the {} backend at {}: {}",
            kind, err.target, err.message
        ),
    }
}

static GLOBAL: OnceLock<StoreContext> = OnceLock::new();

/// Process-wide context configured from the environment
///
/// Hosts that need several independent stores should own `StoreContext`
/// values instead.
pub fn global() -> &'static StoreContext {
    GLOBAL.get_or_init(StoreContext::from_env)
}
