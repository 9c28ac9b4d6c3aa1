//! Bookkeeping of active watches
//!
//! The table mirrors the kernel's watch set: an entry exists exactly while
//! the kernel still holds the watch. Entries are added after a successful
//! registration and removed after a successful removal or once a terminal
//! event reports the kernel dropped the watch on its own.

use crate::error::WatchError;
use crate::session::Session;
use ahash::AHashMap;
use inwatch_core::{Event, EventMask, WatchDescriptor};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// One registered watch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEntry {
    pub wd: WatchDescriptor,
    /// Mask as last requested (merged when registered with `MASK_ADD`)
    pub mask: EventMask,
    /// Path the watch was registered with
    pub target: PathBuf,
}

#[derive(Default)]
struct Tables {
    by_wd: AHashMap<WatchDescriptor, WatchEntry>,
    by_path: AHashMap<PathBuf, WatchDescriptor>,
}

impl Tables {
    fn insert(&mut self, entry: WatchEntry) {
        if let Some(previous) = self.by_wd.get(&entry.wd) {
            // Another path to the same inode, or a re-registration
            if previous.target != entry.target {
                self.by_path.remove(&previous.target);
            }
        }
        self.by_path.insert(entry.target.clone(), entry.wd);
        self.by_wd.insert(entry.wd, entry);
    }

    fn remove(&mut self, wd: WatchDescriptor) -> Option<WatchEntry> {
        let entry = self.by_wd.remove(&wd)?;
        if self.by_path.get(&entry.target) == Some(&wd) {
            self.by_path.remove(&entry.target);
        }
        Some(entry)
    }
}

/// Watches registered through one session
pub struct WatchTable {
    session: Arc<Session>,
    tables: RwLock<Tables>,
}

impl WatchTable {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            tables: RwLock::new(Tables::default()),
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Register a watch with the kernel and record it
    pub fn register(&self, target: &Path, mask: EventMask) -> Result<WatchDescriptor, WatchError> {
        // Held across the syscall so the table and kernel change together
        let mut tables = self.tables.write();
        let wd = self.session.add_watch(target, mask)?;

        let mask = match tables.by_wd.get(&wd) {
            Some(existing) if mask.contains(EventMask::MASK_ADD) => existing.mask | mask,
            _ => mask,
        };
        tables.insert(WatchEntry {
            wd,
            mask,
            target: target.to_path_buf(),
        });
        Ok(wd)
    }

    /// Remove a watch from the kernel, then from the table
    ///
    /// The entry stays if the kernel call fails.
    pub fn unregister(&self, wd: WatchDescriptor) -> Result<WatchEntry, WatchError> {
        let mut tables = self.tables.write();
        self.session.remove_watch(wd)?;

        tables.remove(wd).ok_or(WatchError::UnknownDescriptor(wd))
    }

    /// Forget a watch the kernel already invalidated
    ///
    /// No syscall is issued. Returns the entry if it was present.
    pub fn on_terminal_event(&self, wd: WatchDescriptor) -> Option<WatchEntry> {
        let removed = self.tables.write().remove(wd);
        if let Some(entry) = &removed {
            debug!(wd = wd.as_raw(), target = %entry.target.display(), "watch invalidated by kernel");
        }
        removed
    }

    pub fn get(&self, wd: WatchDescriptor) -> Option<WatchEntry> {
        self.tables.read().by_wd.get(&wd).cloned()
    }

    pub fn contains(&self, wd: WatchDescriptor) -> bool {
        self.tables.read().by_wd.contains_key(&wd)
    }

    pub fn path_of(&self, wd: WatchDescriptor) -> Option<PathBuf> {
        self.tables.read().by_wd.get(&wd).map(|entry| entry.target.clone())
    }

    pub fn descriptor_of(&self, target: &Path) -> Option<WatchDescriptor> {
        self.tables.read().by_path.get(target).copied()
    }

    /// Path an event refers to: the watched target joined with the event name
    pub fn resolve(&self, event: &Event) -> Option<PathBuf> {
        let target = self.path_of(event.wd())?;
        Some(match event.name() {
            Some(name) => target.join(name),
            None => target,
        })
    }

    pub fn len(&self) -> usize {
        self.tables.read().by_wd.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.read().by_wd.is_empty()
    }

    /// Snapshot of all entries, ordered by descriptor
    pub fn entries(&self) -> Vec<WatchEntry> {
        let mut entries: Vec<_> = self.tables.read().by_wd.values().cloned().collect();
        entries.sort_by_key(|entry| entry.wd);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{IoFailure, Stage};
    use nix::errno::Errno;
    use std::fs;
    use tempfile::TempDir;

    fn table() -> WatchTable {
        WatchTable::new(Arc::new(Session::open().unwrap()))
    }

    #[test]
    fn test_register_and_lookup() {
        let dir = TempDir::new().unwrap();
        let table = table();
        assert!(table.is_empty());

        let wd = table.register(dir.path(), EventMask::CREATE).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.path_of(wd).as_deref(), Some(dir.path()));
        assert_eq!(table.descriptor_of(dir.path()), Some(wd));

        let entry = table.get(wd).unwrap();
        assert_eq!(entry.mask, EventMask::CREATE);
    }

    #[test]
    fn test_reregister_updates_entry() {
        let dir = TempDir::new().unwrap();
        let table = table();

        let wd = table.register(dir.path(), EventMask::CREATE).unwrap();
        let again = table
            .register(dir.path(), EventMask::DELETE | EventMask::MASK_ADD)
            .unwrap();

        assert_eq!(wd, again);
        assert_eq!(table.len(), 1);
        assert!(table.get(wd).unwrap().mask.contains(EventMask::CREATE | EventMask::DELETE));

        table.register(dir.path(), EventMask::MODIFY).unwrap();
        assert_eq!(table.get(wd).unwrap().mask, EventMask::MODIFY);
    }

    #[test]
    fn test_failed_register_leaves_table_untouched() {
        let dir = TempDir::new().unwrap();
        let table = table();

        assert!(table.register(&dir.path().join("missing"), EventMask::MODIFY).is_err());
        assert!(table.is_empty());
    }

    #[test]
    fn test_unregister() {
        let dir = TempDir::new().unwrap();
        let table = table();
        let wd = table.register(dir.path(), EventMask::CREATE).unwrap();

        let entry = table.unregister(wd).unwrap();
        assert_eq!(entry.target, dir.path());
        assert!(!table.contains(wd));
        assert_eq!(table.descriptor_of(dir.path()), None);
    }

    #[test]
    fn test_failed_unregister_keeps_entry() {
        let dir = TempDir::new().unwrap();
        let table = table();
        let wd = table.register(dir.path(), EventMask::CREATE).unwrap();

        // Kernel loses the watch behind the table's back
        table.session().remove_watch(wd).unwrap();

        let err = table.unregister(wd).unwrap_err();
        assert_eq!(err, WatchError::Io(IoFailure::new(Stage::RemoveWatch, Errno::EINVAL)));
        assert!(table.contains(wd));
    }

    #[test]
    fn test_terminal_event_removes_without_syscall() {
        let dir = TempDir::new().unwrap();
        let table = table();
        let wd = table.register(dir.path(), EventMask::CREATE).unwrap();

        assert!(table.on_terminal_event(wd).is_some());
        assert!(!table.contains(wd));

        // Unknown descriptors are simply absent
        assert!(table.on_terminal_event(wd).is_none());
        assert!(table.get(WatchDescriptor::from_raw(9999)).is_none());

        // The kernel watch was left alone
        table.session().remove_watch(wd).unwrap();
    }

    #[test]
    fn test_resolve() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file.txt");
        fs::write(&file, b"x").unwrap();

        let table = table();
        let dir_wd = table.register(dir.path(), EventMask::CREATE).unwrap();
        let file_wd = table.register(&file, EventMask::MODIFY).unwrap();

        let named = Event::new(dir_wd, EventMask::CREATE, 0, Some("new.txt".into()));
        assert_eq!(table.resolve(&named), Some(dir.path().join("new.txt")));

        let own = Event::new(file_wd, EventMask::MODIFY, 0, None);
        assert_eq!(table.resolve(&own), Some(file));

        let unknown = Event::new(WatchDescriptor::OVERFLOW, EventMask::Q_OVERFLOW, 0, None);
        assert_eq!(table.resolve(&unknown), None);
    }

    #[test]
    fn test_entries_sorted() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::create_dir(&a).unwrap();
        fs::create_dir(&b).unwrap();

        let table = table();
        let wd_b = table.register(&b, EventMask::CREATE).unwrap();
        let wd_a = table.register(&a, EventMask::CREATE).unwrap();

        let wds: Vec<_> = table.entries().iter().map(|e| e.wd).collect();
        let mut expected = vec![wd_b, wd_a];
        expected.sort();
        assert_eq!(wds, expected);
    }
}
