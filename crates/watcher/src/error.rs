//! Error taxonomy for the notification engine

use inwatch_core::{EventMask, MalformedStream, WatchDescriptor};
use nix::errno::Errno;
use std::fmt;
use thiserror::Error;

/// Where in the engine a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Open,
    AddWatch,
    RemoveWatch,
    /// Creating or populating the readiness multiplexer
    Multiplexer,
    Wait,
    /// Querying the pending byte count
    Query,
    Read,
    Decode,
    Dispatch,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Open => "open",
            Stage::AddWatch => "add watch",
            Stage::RemoveWatch => "remove watch",
            Stage::Multiplexer => "multiplexer setup",
            Stage::Wait => "wait",
            Stage::Query => "pending byte query",
            Stage::Read => "read",
            Stage::Decode => "decode",
            Stage::Dispatch => "dispatch",
        };
        f.write_str(name)
    }
}

/// Syscall failure carrying the platform error code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{stage} failed: {errno}")]
pub struct IoFailure {
    pub stage: Stage,
    pub errno: Errno,
}

impl IoFailure {
    pub fn new(stage: Stage, errno: Errno) -> Self {
        Self { stage, errno }
    }
}

/// Which kernel resource ran out while opening a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Per-user instance limit (`max_user_instances`) or per-process descriptor limit
    InstanceLimit,
    /// System-wide open file limit
    SystemLimit,
    /// Kernel could not allocate memory for the instance
    KernelMemory,
    /// Cancellation channel could not be created
    ChannelCreationFailed,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ResourceKind::InstanceLimit => "user instance limit reached",
            ResourceKind::SystemLimit => "system file limit reached",
            ResourceKind::KernelMemory => "insufficient kernel memory",
            ResourceKind::ChannelCreationFailed => "cancellation channel creation failed",
        };
        f.write_str(text)
    }
}

/// Session could not be opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot open notification session: {kind} ({errno})")]
pub struct ResourceExhausted {
    pub kind: ResourceKind,
    pub errno: Errno,
}

impl ResourceExhausted {
    /// Classify a failed notification instance creation
    pub fn from_init_errno(errno: Errno) -> Self {
        let kind = match errno {
            Errno::EMFILE => ResourceKind::InstanceLimit,
            Errno::ENFILE => ResourceKind::SystemLimit,
            _ => ResourceKind::KernelMemory,
        };
        Self { kind, errno }
    }

    pub fn channel(errno: Errno) -> Self {
        Self {
            kind: ResourceKind::ChannelCreationFailed,
            errno,
        }
    }
}

/// Watch registration or removal failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WatchError {
    #[error("per-instance watch limit reached")]
    LimitExceeded,

    #[error(transparent)]
    Io(#[from] IoFailure),

    #[error("session is closed")]
    SessionClosed,

    #[error("unknown watch descriptor {0}")]
    UnknownDescriptor(WatchDescriptor),
}

impl WatchError {
    /// Classify a failed `inotify_add_watch`
    pub fn from_add_errno(errno: Errno) -> Self {
        match errno {
            Errno::ENOSPC => WatchError::LimitExceeded,
            errno => WatchError::Io(IoFailure::new(Stage::AddWatch, errno)),
        }
    }

    pub fn from_remove_errno(errno: Errno) -> Self {
        WatchError::Io(IoFailure::new(Stage::RemoveWatch, errno))
    }

    /// Platform error code, if the kernel reported one
    pub fn errno(&self) -> Option<Errno> {
        match self {
            WatchError::LimitExceeded => Some(Errno::ENOSPC),
            WatchError::Io(failure) => Some(failure.errno),
            WatchError::SessionClosed | WatchError::UnknownDescriptor(_) => None,
        }
    }
}

/// Anything that can end `EventLoop::run` other than cancellation
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Open(#[from] ResourceExhausted),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error("session is closed")]
    SessionClosed,

    #[error("event loop already running on this session")]
    AlreadyRunning,

    #[error(transparent)]
    Io(#[from] IoFailure),

    #[error("read failed: short read of {actual} bytes, expected {expected}")]
    ShortRead { expected: usize, actual: usize },

    #[error("decode failed: {0}")]
    Malformed(#[from] MalformedStream),

    #[error("dispatch failed: handler rejected event wd={wd} mask={mask}")]
    Handler {
        wd: WatchDescriptor,
        mask: EventMask,
        #[source]
        source: anyhow::Error,
    },
}

impl EngineError {
    /// Stage the error came from, if it came from one
    pub fn stage(&self) -> Option<Stage> {
        match self {
            EngineError::Open(_) => Some(Stage::Open),
            EngineError::Watch(WatchError::Io(failure)) => Some(failure.stage),
            EngineError::Watch(WatchError::LimitExceeded) => Some(Stage::AddWatch),
            EngineError::Watch(_) | EngineError::SessionClosed | EngineError::AlreadyRunning => None,
            EngineError::Io(failure) => Some(failure.stage),
            EngineError::ShortRead { .. } => Some(Stage::Read),
            EngineError::Malformed(_) => Some(Stage::Decode),
            EngineError::Handler { .. } => Some(Stage::Dispatch),
        }
    }
}
