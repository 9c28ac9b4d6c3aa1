//! Data model for inotify change notifications
//!
//! This crate provides:
//! - Event masks matching the kernel's bit layout
//! - Watch descriptors, cookies and decoded events
//! - A pure decoder for the kernel's variable-length record stream
//! - Readers for the kernel's inotify tunables
//!
//! Nothing in here performs syscalls other than the `/proc` reads in
//! [`limits`].

pub mod decode;
pub mod event;
pub mod limits;
pub mod mask;

// Re-exports
pub use decode::{decode, records, Decoded, MalformedReason, MalformedStream, Records, HEADER_SIZE};
pub use event::{Cookie, Event, WatchDescriptor};
pub use limits::{Limits, LimitsError, Tunable};
pub use mask::EventMask;
