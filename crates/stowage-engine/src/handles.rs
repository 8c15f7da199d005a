//! Live-handle coordination shared by the engines.
//!
//! Tracks every open handle per database name so an upgrading open can
//! notify older handles and wait for them to close.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::Notify;

use crate::error::{EngineError, Result};
use crate::traits::{BlockedAction, OpenHooks, VersionChange, VersionChangeListener};

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) struct HandleState {
    version: u64,
    closed: AtomicBool,
    listeners: Mutex<Vec<VersionChangeListener>>,
    closed_signal: Arc<Notify>,
}

impl HandleState {
    pub(crate) fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.closed_signal.notify_waiters();
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(EngineError::Closed)
        } else {
            Ok(())
        }
    }
}

/// Token that closes one database handle.
///
/// Handed to version-change listeners so they can release the handle
/// without owning it.
#[derive(Clone)]
pub struct CloseHandle(Arc<HandleState>);

impl CloseHandle {
    /// Close the handle.
    pub fn close(&self) {
        self.0.close();
    }

    /// Whether the handle is closed.
    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }
}

impl fmt::Debug for CloseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloseHandle")
            .field("version", &self.0.version)
            .field("closed", &self.0.is_closed())
            .finish()
    }
}

/// Registry of open handles, keyed by database name.
pub(crate) struct LiveHandles {
    handles: Mutex<HashMap<String, Vec<Weak<HandleState>>>>,
    closed_signal: Arc<Notify>,
}

impl LiveHandles {
    pub(crate) fn new() -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
            closed_signal: Arc::new(Notify::new()),
        }
    }

    /// Track a newly opened handle.
    ///
    /// The listener is attached before the handle is published, so an
    /// eviction running right after this call always reaches it.
    pub(crate) fn register(
        &self,
        name: &str,
        version: u64,
        listener: Option<VersionChangeListener>,
    ) -> Arc<HandleState> {
        let state = Arc::new(HandleState {
            version,
            closed: AtomicBool::new(false),
            listeners: Mutex::new(listener.into_iter().collect()),
            closed_signal: Arc::clone(&self.closed_signal),
        });
        lock(&self.handles)
            .entry(name.to_string())
            .or_default()
            .push(Arc::downgrade(&state));
        state
    }

    /// Open handles for `name`, pruning dead entries.
    fn live(&self, name: &str) -> Vec<Arc<HandleState>> {
        let mut handles = lock(&self.handles);
        let Some(entries) = handles.get_mut(name) else {
            return Vec::new();
        };
        entries.retain(|weak| weak.upgrade().map_or(false, |h| !h.is_closed()));
        entries.iter().filter_map(Weak::upgrade).collect()
    }

    /// Notify every open handle of `name` that `new_version` is being
    /// installed, then wait for all of them to close.
    ///
    /// Listeners run synchronously, so a handle that closes from its listener
    /// never causes a `blocked` call.
    pub(crate) async fn evict(
        &self,
        name: &str,
        new_version: u64,
        hooks: &mut dyn OpenHooks,
    ) -> Result<()> {
        let live = self.live(name);
        if live.is_empty() {
            return Ok(());
        }

        for handle in &live {
            let event = VersionChange::new(handle.version, new_version, CloseHandle(Arc::clone(handle)));
            for listener in lock(&handle.listeners).iter() {
                listener(&event);
            }
        }
        drop(live);

        let remaining = self.live(name);
        let Some(oldest) = remaining.iter().map(|h| h.version).min() else {
            return Ok(());
        };
        drop(remaining);

        tracing::warn!(
            database = name,
            old_version = oldest,
            new_version,
            "open blocked by connections that did not close"
        );

        match hooks.blocked(oldest, new_version) {
            BlockedAction::Abort => Err(EngineError::Blocked {
                old_version: oldest,
                new_version,
            }),
            BlockedAction::Wait => {
                self.wait_until_closed(name).await;
                Ok(())
            }
        }
    }

    async fn wait_until_closed(&self, name: &str) {
        loop {
            let notified = self.closed_signal.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.live(name).is_empty() {
                return;
            }
            notified.await;
        }
    }
}
