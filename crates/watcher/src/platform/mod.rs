//! Platform syscall layer
//!
//! Thin, safe wrappers around the kernel interfaces the engine needs:
//! the notification instance, watch registration, pending-byte queries,
//! blocking reads and the cancellation pipe.

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(target_os = "linux")]
pub use linux::*;
