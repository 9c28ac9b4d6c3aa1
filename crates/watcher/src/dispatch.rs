//! Routing of decoded events to per-watch listeners

use crate::error::WatchError;
use crate::event_loop::EventHandler;
use crate::watch_table::WatchTable;
use ahash::AHashMap;
use inwatch_core::{Event, EventMask, WatchDescriptor};
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Application callback for one or more watches
///
/// Called on the loop thread. An error is fatal to the loop.
pub trait WatchListener: Send + Sync {
    /// An event for a watch this listener is attached to. `path` is the
    /// watched target joined with the event's name, when known.
    fn on_event(&self, event: &Event, path: Option<&Path>) -> anyhow::Result<()>;

    /// The kernel queue overflowed and events were lost
    fn on_overflow(&self, event: &Event) -> anyhow::Result<()> {
        let _ = event;
        Ok(())
    }
}

type Listeners = AHashMap<WatchDescriptor, Vec<Arc<dyn WatchListener>>>;

/// [`EventHandler`] that fans events out to listeners by watch descriptor
///
/// Cloning is cheap; clones share the table and the listener set, so one
/// clone can drive the loop while another attaches listeners.
///
/// Watches should be removed through [`Dispatcher::unwatch`]. Listeners of a
/// watch removed directly on the table are dropped the next time an event
/// or an overflow names it, and never called again.
#[derive(Clone)]
pub struct Dispatcher {
    table: Arc<WatchTable>,
    listeners: Arc<RwLock<Listeners>>,
}

impl Dispatcher {
    pub fn new(table: Arc<WatchTable>) -> Self {
        Self {
            table,
            listeners: Arc::new(RwLock::new(AHashMap::new())),
        }
    }

    pub fn table(&self) -> &Arc<WatchTable> {
        &self.table
    }

    /// Attach `listener` to an existing watch
    pub fn add_listener(
        &self,
        wd: WatchDescriptor,
        listener: Arc<dyn WatchListener>,
    ) -> Result<(), WatchError> {
        if !self.table.contains(wd) {
            return Err(WatchError::UnknownDescriptor(wd));
        }
        self.listeners.write().entry(wd).or_default().push(listener);
        Ok(())
    }

    /// Detach every listener from `wd`, returning how many were attached
    pub fn remove_listeners(&self, wd: WatchDescriptor) -> usize {
        self.listeners.write().remove(&wd).map_or(0, |list| list.len())
    }

    /// Register a watch and attach `listener` to it
    pub fn watch(
        &self,
        target: &Path,
        mask: EventMask,
        listener: Arc<dyn WatchListener>,
    ) -> Result<WatchDescriptor, WatchError> {
        let wd = self.table.register(target, mask)?;
        self.add_listener(wd, listener)?;
        Ok(wd)
    }

    /// Remove a watch and drop its listeners
    pub fn unwatch(&self, wd: WatchDescriptor) -> Result<(), WatchError> {
        self.table.unregister(wd)?;
        self.remove_listeners(wd);
        Ok(())
    }

    pub fn listener_count(&self, wd: WatchDescriptor) -> usize {
        self.listeners.read().get(&wd).map_or(0, Vec::len)
    }

    /// Deliver one event
    pub fn dispatch(&self, event: &Event) -> anyhow::Result<()> {
        if event.is_overflow() {
            return self.broadcast_overflow(event);
        }

        let wd = event.wd();
        if !self.table.contains(wd) {
            if event.is_ignored() {
                // Tail of a watch already removed through `unwatch`
                trace!(%event, "ignored event for forgotten watch");
            } else {
                warn!(%event, "event for unknown watch descriptor");
            }
            let stale = self.remove_listeners(wd);
            if stale > 0 {
                debug!(wd = wd.as_raw(), listeners = stale, "dropped listeners of removed watch");
            }
            return Ok(());
        }

        let path = self.table.resolve(event);
        // Snapshot so listeners may attach or detach while running
        let targets = self.listeners.read().get(&wd).cloned().unwrap_or_default();
        for listener in &targets {
            listener.on_event(event, path.as_deref())?;
        }

        if event.is_terminal() {
            self.table.on_terminal_event(wd);
            let dropped = self.remove_listeners(wd);
            debug!(wd = wd.as_raw(), listeners = dropped, "watch ended");
        }
        Ok(())
    }

    fn broadcast_overflow(&self, event: &Event) -> anyhow::Result<()> {
        warn!("kernel event queue overflowed");
        self.prune_stale();

        let mut unique: Vec<Arc<dyn WatchListener>> = Vec::new();
        for listener in self.listeners.read().values().flatten() {
            if !unique.iter().any(|seen| Arc::ptr_eq(seen, listener)) {
                unique.push(Arc::clone(listener));
            }
        }

        for listener in unique {
            listener.on_overflow(event)?;
        }
        Ok(())
    }

    /// Drop listeners whose watch is no longer in the table
    fn prune_stale(&self) {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|wd, _| self.table.contains(*wd));
        if listeners.len() < before {
            debug!(watches = before - listeners.len(), "pruned listeners of removed watches");
        }
    }
}

impl EventHandler for Dispatcher {
    fn handle(&mut self, event: Event) -> anyhow::Result<()> {
        self.dispatch(&event)
    }
}
