//! Decoded notification events

use crate::mask::EventMask;
use std::fmt;

/// Kernel identifier of one registered watch
///
/// Unique among the watches currently active on a session. The kernel may
/// hand the same value out again after the watch is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchDescriptor(i32);

impl WatchDescriptor {
    /// Descriptor carried by queue-overflow records, which belong to no watch
    pub const OVERFLOW: Self = Self(-1);

    /// Wrap a raw descriptor value
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    /// Raw descriptor value
    pub const fn as_raw(&self) -> i32 {
        self.0
    }

    /// True for descriptors that can name a watch
    pub const fn is_valid(&self) -> bool {
        self.0 >= 0
    }
}

impl fmt::Display for WatchDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Correlation value shared by the two halves of a rename
///
/// Zero on every event that is not part of a rename pair.
pub type Cookie = u32;

/// One change notification
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Event {
    wd: WatchDescriptor,
    mask: EventMask,
    cookie: Cookie,
    name: Option<String>,
}

impl Event {
    pub fn new(wd: WatchDescriptor, mask: EventMask, cookie: Cookie, name: Option<String>) -> Self {
        Self { wd, mask, cookie, name }
    }

    /// Watch the event was reported on
    pub fn wd(&self) -> WatchDescriptor {
        self.wd
    }

    pub fn mask(&self) -> EventMask {
        self.mask
    }

    pub fn cookie(&self) -> Cookie {
        self.cookie
    }

    /// Name of the affected entry, relative to the watched directory
    ///
    /// `None` for events about the watched target itself, and for records
    /// whose name could not be decoded as UTF-8.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_access(&self) -> bool {
        self.mask.contains(EventMask::ACCESS)
    }

    pub fn is_modify(&self) -> bool {
        self.mask.contains(EventMask::MODIFY)
    }

    pub fn is_attrib(&self) -> bool {
        self.mask.contains(EventMask::ATTRIB)
    }

    pub fn is_close_write(&self) -> bool {
        self.mask.contains(EventMask::CLOSE_WRITE)
    }

    pub fn is_close_nowrite(&self) -> bool {
        self.mask.contains(EventMask::CLOSE_NOWRITE)
    }

    /// Either kind of close
    pub fn is_close(&self) -> bool {
        self.mask.intersects(EventMask::CLOSE)
    }

    pub fn is_open(&self) -> bool {
        self.mask.contains(EventMask::OPEN)
    }

    pub fn is_create(&self) -> bool {
        self.mask.contains(EventMask::CREATE)
    }

    pub fn is_delete(&self) -> bool {
        self.mask.contains(EventMask::DELETE)
    }

    pub fn is_delete_self(&self) -> bool {
        self.mask.contains(EventMask::DELETE_SELF)
    }

    pub fn is_move_self(&self) -> bool {
        self.mask.contains(EventMask::MOVE_SELF)
    }

    pub fn is_moved_from(&self) -> bool {
        self.mask.contains(EventMask::MOVED_FROM)
    }

    pub fn is_moved_to(&self) -> bool {
        self.mask.contains(EventMask::MOVED_TO)
    }

    /// Either half of a rename
    pub fn is_moved(&self) -> bool {
        self.mask.intersects(EventMask::MOVE)
    }

    /// Subject of the event is a directory
    pub fn is_dir(&self) -> bool {
        self.mask.contains(EventMask::ISDIR)
    }

    pub fn is_ignored(&self) -> bool {
        self.mask.contains(EventMask::IGNORED)
    }

    pub fn is_unmount(&self) -> bool {
        self.mask.contains(EventMask::UNMOUNT)
    }

    /// Kernel dropped events because the queue was full
    pub fn is_overflow(&self) -> bool {
        self.mask.contains(EventMask::Q_OVERFLOW)
    }

    /// Watch descriptor is no longer valid after this event
    pub fn is_terminal(&self) -> bool {
        self.mask.is_terminal()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wd={} mask={} cookie={}", self.wd, self.mask, self.cookie)?;
        if let Some(name) = &self.name {
            write!(f, " name={}", name)?;
        }
        Ok(())
    }
}
