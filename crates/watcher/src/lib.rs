//! Cancellable inotify engine
//!
//! This crate provides:
//! - A notification session owning the inotify descriptor and a private
//!   cancellation pipe
//! - A blocking event loop that multiplexes both and delivers every decoded
//!   event, in kernel order, to a handler
//! - A watch table mirroring the kernel's watch set
//! - A dispatcher routing events to per-watch listeners
//!
//! Only Linux is supported; on other targets the crate is empty.
//!
//! ```no_run
//! use inwatch_watcher::{Event, EventLoop, EventMask, Session};
//! use std::path::Path;
//!
//! # fn main() -> anyhow::Result<()> {
//! let session = Session::open()?;
//! session.add_watch(Path::new("/tmp"), EventMask::CREATE | EventMask::DELETE)?;
//!
//! EventLoop::run(&session, |event: Event| -> anyhow::Result<()> {
//!     println!("{event}");
//!     Ok(())
//! })?;
//! # Ok(())
//! # }
//! ```

#[cfg(target_os = "linux")]
pub mod dispatch;
#[cfg(target_os = "linux")]
pub mod error;
#[cfg(target_os = "linux")]
pub mod event_loop;
#[cfg(target_os = "linux")]
pub mod platform;
#[cfg(target_os = "linux")]
pub mod session;
#[cfg(target_os = "linux")]
pub mod watch_table;

#[cfg(target_os = "linux")]
pub use dispatch::{Dispatcher, WatchListener};
#[cfg(target_os = "linux")]
pub use error::{EngineError, IoFailure, ResourceExhausted, ResourceKind, Stage, WatchError};
#[cfg(target_os = "linux")]
pub use event_loop::{EventHandler, EventLoop, LoopState, LoopStats};
#[cfg(target_os = "linux")]
pub use session::{Session, SessionState};
#[cfg(target_os = "linux")]
pub use watch_table::{WatchEntry, WatchTable};

pub use inwatch_core::{Cookie, Event, EventMask, WatchDescriptor};
