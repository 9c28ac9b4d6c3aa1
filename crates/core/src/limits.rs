//! Kernel tunables for the inotify facility
//!
//! Exposed under `/proc/sys/fs/inotify/`. Reading is unprivileged; writing
//! normally needs root.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directory holding the inotify tunables
pub const PROC_DIR: &str = "/proc/sys/fs/inotify";

/// One of the three inotify tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tunable {
    /// Upper bound on events queued per instance before overflow
    MaxQueuedEvents,
    /// Upper bound on instances per real user ID
    MaxUserInstances,
    /// Upper bound on watches per real user ID
    MaxUserWatches,
}

impl Tunable {
    pub const ALL: [Tunable; 3] = [
        Tunable::MaxQueuedEvents,
        Tunable::MaxUserInstances,
        Tunable::MaxUserWatches,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            Tunable::MaxQueuedEvents => "max_queued_events",
            Tunable::MaxUserInstances => "max_user_instances",
            Tunable::MaxUserWatches => "max_user_watches",
        }
    }
}

#[derive(Debug, Error)]
pub enum LimitsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unexpected contents in {path}: {contents:?}")]
    Parse { path: PathBuf, contents: String },

    #[error("permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Snapshot of all three tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_queued_events: u64,
    pub max_user_instances: u64,
    pub max_user_watches: u64,
}

impl Limits {
    /// Read the live kernel values
    pub fn read() -> Result<Self, LimitsError> {
        Self::read_from(Path::new(PROC_DIR))
    }

    /// Read from an alternate directory with the same layout
    pub fn read_from(dir: &Path) -> Result<Self, LimitsError> {
        Ok(Self {
            max_queued_events: read_tunable_in(dir, Tunable::MaxQueuedEvents)?,
            max_user_instances: read_tunable_in(dir, Tunable::MaxUserInstances)?,
            max_user_watches: read_tunable_in(dir, Tunable::MaxUserWatches)?,
        })
    }

    pub fn get(&self, tunable: Tunable) -> u64 {
        match tunable {
            Tunable::MaxQueuedEvents => self.max_queued_events,
            Tunable::MaxUserInstances => self.max_user_instances,
            Tunable::MaxUserWatches => self.max_user_watches,
        }
    }
}

pub fn max_queued_events() -> Result<u64, LimitsError> {
    read_tunable(Tunable::MaxQueuedEvents)
}

pub fn max_user_instances() -> Result<u64, LimitsError> {
    read_tunable(Tunable::MaxUserInstances)
}

pub fn max_user_watches() -> Result<u64, LimitsError> {
    read_tunable(Tunable::MaxUserWatches)
}

pub fn read_tunable(tunable: Tunable) -> Result<u64, LimitsError> {
    read_tunable_in(Path::new(PROC_DIR), tunable)
}

pub fn read_tunable_in(dir: &Path, tunable: Tunable) -> Result<u64, LimitsError> {
    let path = dir.join(tunable.file_name());
    let contents = fs::read_to_string(&path).map_err(|source| LimitsError::Read {
        path: path.clone(),
        source,
    })?;

    contents
        .trim()
        .parse()
        .map_err(|_| LimitsError::Parse { path, contents })
}

/// Whether the current process may change a tunable
pub fn is_tunable(tunable: Tunable) -> bool {
    is_tunable_in(Path::new(PROC_DIR), tunable)
}

pub fn is_tunable_in(dir: &Path, tunable: Tunable) -> bool {
    fs::OpenOptions::new()
        .write(true)
        .open(dir.join(tunable.file_name()))
        .is_ok()
}

pub fn set_tunable(tunable: Tunable, value: u64) -> Result<(), LimitsError> {
    set_tunable_in(Path::new(PROC_DIR), tunable, value)
}

pub fn set_tunable_in(dir: &Path, tunable: Tunable, value: u64) -> Result<(), LimitsError> {
    let path = dir.join(tunable.file_name());
    match fs::write(&path, value.to_string()) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            Err(LimitsError::PermissionDenied { path })
        }
        Err(source) => Err(LimitsError::Write { path, source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fake_proc(queued: &str, instances: &str, watches: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("max_queued_events"), queued).unwrap();
        fs::write(dir.path().join("max_user_instances"), instances).unwrap();
        fs::write(dir.path().join("max_user_watches"), watches).unwrap();
        dir
    }

    #[test]
    fn test_read_from_directory() {
        let dir = fake_proc("16384\n", "128\n", "8192\n");
        let limits = Limits::read_from(dir.path()).unwrap();

        assert_eq!(limits.max_queued_events, 16384);
        assert_eq!(limits.max_user_instances, 128);
        assert_eq!(limits.get(Tunable::MaxUserWatches), 8192);
    }

    #[test]
    fn test_parse_error() {
        let dir = fake_proc("lots", "128", "8192");
        let err = Limits::read_from(dir.path()).unwrap_err();
        assert!(matches!(err, LimitsError::Parse { .. }));
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = read_tunable_in(dir.path(), Tunable::MaxUserWatches).unwrap_err();
        assert!(matches!(err, LimitsError::Read { .. }));
    }

    #[test]
    fn test_set_and_read_back() {
        let dir = fake_proc("16384", "128", "8192");
        assert!(is_tunable_in(dir.path(), Tunable::MaxUserWatches));

        set_tunable_in(dir.path(), Tunable::MaxUserWatches, 524288).unwrap();
        assert_eq!(read_tunable_in(dir.path(), Tunable::MaxUserWatches).unwrap(), 524288);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_live_limits_are_positive() {
        // /proc may be absent in minimal containers
        if let Ok(limits) = Limits::read() {
            assert!(limits.max_user_instances > 0);
            assert!(limits.max_queued_events > 0);
        }
    }
}
