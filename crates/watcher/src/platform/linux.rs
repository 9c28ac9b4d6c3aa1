//! inotify, pipe and ioctl wrappers for Linux
//!
//! nix covers the pipe, fcntl and read/write calls. The inotify calls stay
//! on libc because nix's `WatchDescriptor` cannot be rebuilt from a raw
//! descriptor, which `inotify_rm_watch` needs.

use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::unistd;
use nix::{convert_ioctl_res, ioctl_read_bad, NixPath};
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd};
use std::path::Path;

ioctl_read_bad!(fionread, libc::FIONREAD, libc::c_int);

/// Create a new inotify instance
pub fn inotify_init() -> Result<OwnedFd, Errno> {
    // SAFETY: takes no pointers; the result is checked before use
    let fd = Errno::result(unsafe { libc::inotify_init1(libc::IN_CLOEXEC) })?;
    // SAFETY: fd was just returned by the kernel and is owned by nobody else
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Register or update a watch, returning the raw watch descriptor
///
/// Paths with interior NULs fail with `EINVAL`.
pub fn inotify_add_watch(fd: BorrowedFd<'_>, target: &Path, mask: u32) -> Result<i32, Errno> {
    let wd = target.with_nix_path(|path| {
        // SAFETY: `path` is NUL-terminated and outlives the call
        unsafe { libc::inotify_add_watch(fd.as_raw_fd(), path.as_ptr(), mask) }
    })?;
    Errno::result(wd)
}

pub fn inotify_rm_watch(fd: BorrowedFd<'_>, wd: i32) -> Result<(), Errno> {
    // SAFETY: plain integer arguments; an unknown wd is reported as EINVAL
    Errno::result(unsafe { libc::inotify_rm_watch(fd.as_raw_fd(), wd) }).map(drop)
}

/// Number of bytes that can be read without blocking
pub fn pending_bytes(fd: BorrowedFd<'_>) -> Result<usize, Errno> {
    let mut available: libc::c_int = 0;
    // SAFETY: FIONREAD writes a single c_int through a pointer to a live local
    unsafe { fionread(fd.as_raw_fd(), &mut available) }?;
    Ok(available.max(0) as usize)
}

/// Single `read(2)` into `buf`, returning the byte count
pub fn read(fd: BorrowedFd<'_>, buf: &mut [u8]) -> Result<usize, Errno> {
    unistd::read(fd.as_raw_fd(), buf)
}

/// Create a close-on-exec pipe whose write end never blocks
///
/// Returns `(read_end, write_end)`.
pub fn cancel_pipe() -> Result<(OwnedFd, OwnedFd), Errno> {
    let (read_end, write_end) = unistd::pipe2(OFlag::O_CLOEXEC)?;
    // SAFETY: pipe2 just returned both descriptors and nothing else owns them
    let (read_end, write_end) =
        unsafe { (OwnedFd::from_raw_fd(read_end), OwnedFd::from_raw_fd(write_end)) };

    let flags = OFlag::from_bits_truncate(fcntl(write_end.as_raw_fd(), FcntlArg::F_GETFL)?);
    fcntl(write_end.as_raw_fd(), FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;

    Ok((read_end, write_end))
}

/// Write one wake-up byte to the cancellation pipe
///
/// A full pipe already carries a pending wake-up, so `EAGAIN` is success.
pub fn signal(fd: BorrowedFd<'_>) -> Result<(), Errno> {
    loop {
        match unistd::write(fd.as_raw_fd(), &[1u8]) {
            Ok(_) | Err(Errno::EAGAIN) => return Ok(()),
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e),
        }
    }
}
