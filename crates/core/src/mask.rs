//! Event mask bits for the inotify notification facility
//!
//! One bitset covers three groups of kernel bits:
//! - event kinds reported on a record (`MODIFY`, `CREATE`, ...)
//! - modifiers the kernel attaches to records (`ISDIR`, `IGNORED`, `Q_OVERFLOW`, `UNMOUNT`)
//! - options only meaningful when registering a watch (`ONLYDIR`, `MASK_ADD`, ...)
//!
//! Values match `<sys/inotify.h>` bit-for-bit.

use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Bitset of inotify event kinds, record modifiers and watch options
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventMask: u32 {
        /// File was accessed
        const ACCESS = 0x0000_0001;
        /// File was modified
        const MODIFY = 0x0000_0002;
        /// Metadata changed (permissions, timestamps, xattrs, link count, owner)
        const ATTRIB = 0x0000_0004;
        /// File opened for writing was closed
        const CLOSE_WRITE = 0x0000_0008;
        /// File not opened for writing was closed
        const CLOSE_NOWRITE = 0x0000_0010;
        /// File was opened
        const OPEN = 0x0000_0020;
        /// File moved out of a watched directory
        const MOVED_FROM = 0x0000_0040;
        /// File moved into a watched directory
        const MOVED_TO = 0x0000_0080;
        /// File created in a watched directory
        const CREATE = 0x0000_0100;
        /// File deleted from a watched directory
        const DELETE = 0x0000_0200;
        /// Watched target itself was deleted
        const DELETE_SELF = 0x0000_0400;
        /// Watched target itself was moved
        const MOVE_SELF = 0x0000_0800;

        /// Filesystem backing the watched target was unmounted
        const UNMOUNT = 0x0000_2000;
        /// Kernel event queue overflowed and events were dropped
        const Q_OVERFLOW = 0x0000_4000;
        /// Watch was removed, explicitly or by the kernel
        const IGNORED = 0x0000_8000;

        /// Only watch the target if it is a directory
        const ONLYDIR = 0x0100_0000;
        /// Do not dereference the target if it is a symlink
        const DONT_FOLLOW = 0x0200_0000;
        /// Stop reporting events for children once unlinked
        const EXCL_UNLINK = 0x0400_0000;
        /// Fail registration if the target is already watched
        const MASK_CREATE = 0x1000_0000;
        /// Merge with an existing watch mask instead of replacing it
        const MASK_ADD = 0x2000_0000;
        /// Subject of the event is a directory
        const ISDIR = 0x4000_0000;
        /// Remove the watch after the first event
        const ONESHOT = 0x8000_0000;
    }
}

impl EventMask {
    /// Either kind of close
    pub const CLOSE: Self = Self::CLOSE_WRITE.union(Self::CLOSE_NOWRITE);

    /// Both halves of a rename
    pub const MOVE: Self = Self::MOVED_FROM.union(Self::MOVED_TO);

    /// Every event kind a watch can subscribe to
    pub const ALL_EVENTS: Self = Self::ACCESS
        .union(Self::MODIFY)
        .union(Self::ATTRIB)
        .union(Self::CLOSE)
        .union(Self::OPEN)
        .union(Self::MOVE)
        .union(Self::CREATE)
        .union(Self::DELETE)
        .union(Self::DELETE_SELF)
        .union(Self::MOVE_SELF);

    /// Bits that invalidate the watch descriptor they arrive on
    pub const TERMINAL: Self = Self::IGNORED.union(Self::DELETE_SELF);

    /// Bits only valid when registering a watch
    pub const WATCH_OPTIONS: Self = Self::ONLYDIR
        .union(Self::DONT_FOLLOW)
        .union(Self::EXCL_UNLINK)
        .union(Self::MASK_CREATE)
        .union(Self::MASK_ADD)
        .union(Self::ONESHOT);

    /// True if this mask invalidates its watch descriptor
    pub fn is_terminal(&self) -> bool {
        self.intersects(Self::TERMINAL)
    }

    /// Event kinds only, with modifiers and watch options stripped
    pub fn events(&self) -> Self {
        self.intersection(Self::ALL_EVENTS)
    }

    /// Parse a lowercase event name as used in configuration files
    ///
    /// Accepts the single event kinds (`modify`, `moved_from`, ...) and the
    /// aliases `close`, `move` and `all`.
    pub fn parse_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "close" => Some(Self::CLOSE),
            "move" => Some(Self::MOVE),
            "all" => Some(Self::ALL_EVENTS),
            other => {
                let flag = Self::from_name(&other.to_ascii_uppercase())?;
                flag.intersects(Self::ALL_EVENTS).then_some(flag)
            }
        }
    }

    /// Parse a list of event names into one mask
    ///
    /// Returns the first unrecognised name on failure.
    pub fn parse_names<I, S>(names: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names.into_iter().try_fold(Self::empty(), |mask, name| {
            let name = name.as_ref();
            Self::parse_name(name)
                .map(|flag| mask | flag)
                .ok_or_else(|| name.to_string())
        })
    }
}

impl fmt::Display for EventMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "0");
        }

        let mut first = true;
        for (name, _) in self.iter_names() {
            if !first {
                write!(f, " | ")?;
            }
            write!(f, "{}", name)?;
            first = false;
        }

        // Bits the kernel may add in the future
        let unknown = self.bits() & !Self::all().bits();
        if unknown != 0 {
            if !first {
                write!(f, " | ")?;
            }
            write!(f, "{:#x}", unknown)?;
        }
        Ok(())
    }
}
