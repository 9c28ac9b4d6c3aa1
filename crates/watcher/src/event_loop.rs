//! Cancellable read/decode/dispatch loop
//!
//! ```text
//!          ┌───────────────────────────────┐
//!          v                               │
//!  Idle ──> Waiting ──notify ready──> Draining
//!             │
//!             └──cancel ready──> Cancelled
//!
//!  any state ──error──> Faulted
//! ```
//!
//! The only suspension point is the readiness wait. A batch that has been
//! read is always decoded and dispatched in full (or up to a handler error)
//! before cancellation is looked at again.

use crate::error::{EngineError, IoFailure, Stage};
use crate::platform;
use crate::session::{Reader, Session};
use inwatch_core::{decode, Event};
use nix::errno::Errno;
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags};
use std::os::fd::BorrowedFd;
use tracing::{debug, trace, warn};

const CANCEL_TOKEN: u64 = 0;
const NOTIFY_TOKEN: u64 = 1;

/// Receives decoded events, in kernel order, on the loop thread
///
/// Returning an error stops the loop: remaining events in the batch are not
/// delivered and `run()` returns [`EngineError::Handler`].
pub trait EventHandler {
    fn handle(&mut self, event: Event) -> anyhow::Result<()>;
}

impl<F> EventHandler for F
where
    F: FnMut(Event) -> anyhow::Result<()>,
{
    fn handle(&mut self, event: Event) -> anyhow::Result<()> {
        self(event)
    }
}

/// Position of the loop in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Waiting,
    Draining,
    Cancelled,
    Faulted,
}

/// Counters for one `run()`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub batches: u64,
    pub bytes: u64,
    pub events: u64,
}

/// Blocking event loop bound to one session
pub struct EventLoop<'a, H> {
    session: &'a Session,
    handler: H,
    state: LoopState,
    stats: LoopStats,
}

impl<'a, H: EventHandler> EventLoop<'a, H> {
    pub fn new(session: &'a Session, handler: H) -> Self {
        Self {
            session,
            handler,
            state: LoopState::Idle,
            stats: LoopStats::default(),
        }
    }

    /// Run `handler` over `session` until cancelled or a fatal error
    pub fn run(session: &'a Session, handler: H) -> Result<(), EngineError> {
        Self::new(session, handler).run_to_end().map(drop)
    }

    /// Run until cancelled, returning the loop counters
    ///
    /// Both session descriptors are closed before this returns, on every
    /// exit path. Afterwards [`state`](Self::state) is `Cancelled` or
    /// `Faulted`.
    pub fn run_to_end(&mut self) -> Result<LoopStats, EngineError> {
        let session = self.session;
        let reader = session.attach()?;
        debug!(fd = ?reader.inotify(), "event loop started");

        let result = self.drive(&reader);
        if result.is_err() {
            self.state = LoopState::Faulted;
            reader.fault();
        }
        drop(reader);

        match &result {
            Ok(()) => debug!(
                batches = self.stats.batches,
                events = self.stats.events,
                "event loop cancelled"
            ),
            Err(e) => warn!(error = %e, stage = ?e.stage(), "event loop faulted"),
        }
        result.map(|()| self.stats)
    }

    /// Where the loop stopped, or `Idle` if it never ran
    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    fn drive(&mut self, reader: &Reader<'_>) -> Result<(), EngineError> {
        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC)
            .map_err(|e| IoFailure::new(Stage::Multiplexer, e))?;
        let interest = EpollFlags::EPOLLIN | EpollFlags::EPOLLET;
        epoll
            .add(reader.inotify(), EpollEvent::new(interest, NOTIFY_TOKEN))
            .map_err(|e| IoFailure::new(Stage::Multiplexer, e))?;
        epoll
            .add(reader.cancel(), EpollEvent::new(interest, CANCEL_TOKEN))
            .map_err(|e| IoFailure::new(Stage::Multiplexer, e))?;

        let mut ready = [EpollEvent::empty(); 2];
        loop {
            self.state = LoopState::Waiting;
            let n = match epoll.wait(&mut ready, -1) {
                Ok(n) => n,
                // A signal landed on this thread; nothing became ready
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(IoFailure::new(Stage::Wait, e).into()),
            };

            let ready = &ready[..n];
            if ready.iter().any(|ev| ev.data() == CANCEL_TOKEN) {
                self.state = LoopState::Cancelled;
                return Ok(());
            }

            if ready.iter().any(|ev| ev.data() == NOTIFY_TOKEN) {
                self.state = LoopState::Draining;
                self.drain(reader)?;
            }
            self.state = LoopState::Idle;
        }
    }

    /// Read everything pending and dispatch it in record order
    fn drain(&mut self, reader: &Reader<'_>) -> Result<(), EngineError> {
        let fd = reader.inotify();
        let available = platform::pending_bytes(fd).map_err(|e| IoFailure::new(Stage::Query, e))?;
        if available == 0 {
            trace!("woken with nothing pending");
            return Ok(());
        }

        // Owned per batch, freed on every exit from this scope
        let buf = read_batch(fd, available)?;
        let decoded = decode(&buf)?;
        self.stats.batches += 1;
        self.stats.bytes += decoded.consumed as u64;
        trace!(bytes = decoded.consumed, events = decoded.events.len(), "draining batch");

        for event in decoded.events {
            trace!(%event, "dispatching");
            let (wd, mask) = (event.wd(), event.mask());
            self.handler
                .handle(event)
                .map_err(|source| EngineError::Handler { wd, mask, source })?;
            self.stats.events += 1;
        }
        Ok(())
    }
}

/// Read exactly `available` bytes in one call
fn read_batch(fd: BorrowedFd<'_>, available: usize) -> Result<Vec<u8>, EngineError> {
    let mut buf = vec![0u8; available];
    let read = platform::read(fd, &mut buf).map_err(|e| IoFailure::new(Stage::Read, e))?;
    if read != available {
        return Err(EngineError::ShortRead {
            expected: available,
            actual: read,
        });
    }
    Ok(buf)
}
