//! Notification session lifecycle
//!
//! A session owns the inotify descriptor and the two ends of a private
//! cancellation pipe. Descriptor slots sit behind a short-lived lock so that
//! `cancel()` and `close()` may be called from any thread; the lock is never
//! held across the loop's blocking wait.
//!
//! ```text
//! open() ──> Open ──cancel()/close()/fault──> Closing ──release──> Closed
//!              └───────────close() while idle──────────────────────┘
//! ```

use crate::error::{EngineError, ResourceExhausted, WatchError};
use crate::platform;
use inwatch_core::{EventMask, WatchDescriptor};
use parking_lot::Mutex;
use std::fmt;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::path::Path;
use tracing::{debug, trace, warn};

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Descriptors held, watch operations accepted
    Open,
    /// Shutdown requested; descriptors still held until the loop releases them
    Closing,
    /// Descriptors released; every operation is rejected
    Closed,
}

struct Descriptors {
    inotify: OwnedFd,
    cancel_rx: OwnedFd,
    cancel_tx: OwnedFd,
}

struct Inner {
    state: SessionState,
    fds: Option<Descriptors>,
    /// A loop is currently reading this session
    reading: bool,
    /// The cancellation pipe has been written
    cancelled: bool,
}

/// Kernel notification instance plus its cancellation channel
pub struct Session {
    inner: Mutex<Inner>,
}

impl Session {
    /// Acquire a notification descriptor and a cancellation channel
    ///
    /// If the channel cannot be created the notification descriptor is
    /// released before the error is returned.
    pub fn open() -> Result<Self, ResourceExhausted> {
        let inotify = platform::inotify_init().map_err(ResourceExhausted::from_init_errno)?;

        // On failure `inotify` drops here, closing the descriptor
        let (cancel_rx, cancel_tx) = platform::cancel_pipe().map_err(ResourceExhausted::channel)?;

        debug!(
            fd = inotify.as_raw_fd(),
            cancel_rx = cancel_rx.as_raw_fd(),
            cancel_tx = cancel_tx.as_raw_fd(),
            "opened notification session"
        );

        Ok(Self {
            inner: Mutex::new(Inner {
                state: SessionState::Open,
                fds: Some(Descriptors {
                    inotify,
                    cancel_rx,
                    cancel_tx,
                }),
                reading: false,
                cancelled: false,
            }),
        })
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    /// Register interest in `target`
    ///
    /// Registering a target the kernel already watches returns the existing
    /// descriptor with its mask replaced (or merged, with `MASK_ADD`).
    pub fn add_watch(&self, target: &Path, mask: EventMask) -> Result<WatchDescriptor, WatchError> {
        let inner = self.inner.lock();
        let fds = inner.open_fds()?;

        let wd = platform::inotify_add_watch(fds.inotify.as_fd(), target, mask.bits())
            .map_err(WatchError::from_add_errno)?;

        debug!(wd, target = %target.display(), mask = %mask, "added watch");
        Ok(WatchDescriptor::from_raw(wd))
    }

    /// Remove a watch; fails if the kernel no longer knows the descriptor
    pub fn remove_watch(&self, wd: WatchDescriptor) -> Result<(), WatchError> {
        let inner = self.inner.lock();
        let fds = inner.open_fds()?;

        platform::inotify_rm_watch(fds.inotify.as_fd(), wd.as_raw())
            .map_err(WatchError::from_remove_errno)?;

        debug!(wd = wd.as_raw(), "removed watch");
        Ok(())
    }

    /// Wake the loop and ask it to stop
    ///
    /// One-shot and idempotent: repeated calls, or calls after the session
    /// closed, do nothing. Never blocks.
    pub fn cancel(&self) {
        let mut inner = self.inner.lock();
        inner.signal_cancel();
        if inner.state == SessionState::Open {
            inner.state = SessionState::Closing;
        }
    }

    /// Release both descriptors
    ///
    /// If a loop is reading the session, it is cancelled instead and
    /// releases the descriptors itself before its `run()` returns.
    /// Idempotent.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        if inner.fds.is_none() {
            return;
        }

        if inner.reading {
            inner.signal_cancel();
            inner.state = SessionState::Closing;
            debug!("close deferred to running loop");
        } else {
            inner.release();
        }
    }

    /// Claim the session for one reader
    pub(crate) fn attach(&self) -> Result<Reader<'_>, EngineError> {
        let mut inner = self.inner.lock();
        if inner.reading {
            return Err(EngineError::AlreadyRunning);
        }
        let Some(fds) = inner.fds.as_ref() else {
            return Err(EngineError::SessionClosed);
        };

        let inotify = fds.inotify.as_raw_fd();
        let cancel = fds.cancel_rx.as_raw_fd();
        inner.reading = true;
        trace!(fd = inotify, "reader attached");

        Ok(Reader {
            session: self,
            inotify,
            cancel,
        })
    }

    /// Mark a fault: no more watch operations, release follows
    fn fault(&self) {
        let mut inner = self.inner.lock();
        if inner.state == SessionState::Open {
            inner.state = SessionState::Closing;
        }
    }

    fn detach(&self) {
        let mut inner = self.inner.lock();
        inner.reading = false;
        inner.release();
    }
}

impl Inner {
    fn open_fds(&self) -> Result<&Descriptors, WatchError> {
        match (&self.fds, self.state) {
            (Some(fds), SessionState::Open) => Ok(fds),
            _ => Err(WatchError::SessionClosed),
        }
    }

    fn signal_cancel(&mut self) {
        if self.cancelled {
            return;
        }
        let Some(fds) = self.fds.as_ref() else {
            return;
        };

        match platform::signal(fds.cancel_tx.as_fd()) {
            Ok(()) => trace!("cancellation signalled"),
            // Only EBADF-class bugs land here; nothing for the caller to act on
            Err(errno) => warn!(%errno, "failed to signal cancellation channel"),
        }
        self.cancelled = true;
    }

    fn release(&mut self) {
        if let Some(fds) = self.fds.take() {
            debug!(fd = fds.inotify.as_raw_fd(), "closing notification session");
            drop(fds);
        }
        self.state = SessionState::Closed;
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Session")
            .field("state", &inner.state)
            .field("fd", &inner.fds.as_ref().map(|fds| fds.inotify.as_raw_fd()))
            .field("reading", &inner.reading)
            .field("cancelled", &inner.cancelled)
            .finish()
    }
}

/// Exclusive read access to a session's descriptors for one loop run
///
/// Dropping the reader releases both descriptors, whichever way the loop
/// exits.
pub(crate) struct Reader<'a> {
    session: &'a Session,
    inotify: RawFd,
    cancel: RawFd,
}

impl<'a> Reader<'a> {
    pub(crate) fn inotify(&self) -> BorrowedFd<'_> {
        // SAFETY: descriptors are only released by `detach`, which runs when
        // this reader drops; `close()` defers to us while `reading` is set.
        unsafe { BorrowedFd::borrow_raw(self.inotify) }
    }

    pub(crate) fn cancel(&self) -> BorrowedFd<'_> {
        // SAFETY: as above
        unsafe { BorrowedFd::borrow_raw(self.cancel) }
    }

    pub(crate) fn fault(&self) {
        self.session.fault();
    }
}

impl Drop for Reader<'_> {
    fn drop(&mut self) {
        self.session.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{IoFailure, Stage};
    use nix::errno::Errno;
    use tempfile::TempDir;

    #[test]
    fn test_open_and_close() {
        let session = Session::open().unwrap();
        assert_eq!(session.state(), SessionState::Open);

        session.close();
        assert!(session.is_closed());

        // Idempotent
        session.close();
        assert!(session.is_closed());
    }

    #[test]
    fn test_add_and_remove_watch() {
        let dir = TempDir::new().unwrap();
        let session = Session::open().unwrap();

        let wd = session.add_watch(dir.path(), EventMask::CREATE).unwrap();
        assert!(wd.is_valid());

        session.remove_watch(wd).unwrap();

        // Kernel already forgot it
        let err = session.remove_watch(wd).unwrap_err();
        assert_eq!(err, WatchError::Io(IoFailure::new(Stage::RemoveWatch, Errno::EINVAL)));
    }

    #[test]
    fn test_add_watch_missing_target() {
        let dir = TempDir::new().unwrap();
        let session = Session::open().unwrap();

        let err = session
            .add_watch(&dir.path().join("missing"), EventMask::MODIFY)
            .unwrap_err();
        assert_eq!(err.errno(), Some(Errno::ENOENT));
    }

    #[test]
    fn test_closed_session_rejects_watch_operations() {
        let dir = TempDir::new().unwrap();
        let session = Session::open().unwrap();
        let wd = session.add_watch(dir.path(), EventMask::CREATE).unwrap();
        session.close();

        assert_eq!(
            session.add_watch(dir.path(), EventMask::CREATE),
            Err(WatchError::SessionClosed)
        );
        assert_eq!(session.remove_watch(wd), Err(WatchError::SessionClosed));
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let session = Session::open().unwrap();
        session.cancel();
        session.cancel();
        assert_eq!(session.state(), SessionState::Closing);

        session.close();
        session.cancel();
        assert!(session.is_closed());
    }

    #[test]
    fn test_open_releases_descriptor_when_channel_fails() {
        // The descriptor limit is process-wide, so squeeze it in a child.
        // Between fork and _exit the child only makes syscalls and never
        // allocates; the failure path of `open()` does neither.
        //
        // SAFETY: fork in a test binary; the child never returns into the
        // harness and exits with `_exit`.
        let pid = unsafe { libc::fork() };
        assert!(pid >= 0, "fork failed");

        if pid == 0 {
            // SAFETY: plain descriptor and rlimit syscalls on the child's
            // own table; every exit path goes through `_exit`.
            unsafe {
                // Lowest free slot; everything below it is taken
                let spare = libc::dup(0);
                if spare < 0 {
                    libc::_exit(10);
                }
                let mut limit: libc::rlimit = std::mem::zeroed();
                if libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) != 0 {
                    libc::_exit(11);
                }
                limit.rlim_cur = spare as libc::rlim_t + 1;
                if libc::setrlimit(libc::RLIMIT_NOFILE, &limit) != 0 {
                    libc::_exit(12);
                }
                // Exactly one slot left: the notification descriptor fits,
                // the pipe does not
                libc::close(spare);

                match Session::open() {
                    Err(ResourceExhausted {
                        kind: crate::error::ResourceKind::ChannelCreationFailed,
                        errno: Errno::EMFILE,
                    }) => {}
                    Err(_) => libc::_exit(13),
                    Ok(_) => libc::_exit(14),
                }

                // The slot must be free again
                match platform::inotify_init() {
                    Ok(fd) => drop(fd),
                    Err(_) => libc::_exit(15),
                }
                libc::_exit(0);
            }
        }

        let mut status = 0;
        // SAFETY: pid is our own child; status is a valid out pointer
        let waited = unsafe { libc::waitpid(pid, &mut status, 0) };
        assert_eq!(waited, pid);
        assert!(libc::WIFEXITED(status), "child did not exit cleanly");
        assert_eq!(libc::WEXITSTATUS(status), 0, "child failed at step {}", libc::WEXITSTATUS(status));
    }

    #[test]
    fn test_single_reader() {
        let session = Session::open().unwrap();
        let reader = session.attach().unwrap();
        assert!(matches!(session.attach(), Err(EngineError::AlreadyRunning)));

        // Close while attached is deferred to the reader
        session.close();
        assert_eq!(session.state(), SessionState::Closing);

        drop(reader);
        assert!(session.is_closed());
        assert!(matches!(session.attach(), Err(EngineError::SessionClosed)));
    }
}
