//! Seam between the labeling logic and the kernel
//!
//! Everything that actually touches the host (extended attributes, the
//! `/proc/<tid>/attr/*` files, selinuxfs detection) sits behind
//! [`LabelBackend`]. [`HostBackend`](super::host::HostBackend) is the real
//! implementation; [`MemoryBackend`](super::memory::MemoryBackend) is an
//! in-memory stand-in for tests and dry runs.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// Per-thread label channels the kernel reads when creating new objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Label for the next `execve`
    Exec,
    /// Label for sockets created by this thread
    SockCreate,
    /// Label for kernel keyrings created by this thread
    KeyCreate,
    /// Label for files created by this thread
    FsCreate,
}

impl Channel {
    /// File name under `/proc/thread-self/attr/`
    pub fn attr_name(self) -> &'static str {
        match self {
            Channel::Exec => "exec",
            Channel::SockCreate => "sockcreate",
            Channel::KeyCreate => "keycreate",
            Channel::FsCreate => "fscreate",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.attr_name())
    }
}

/// OS primitives the labeling code depends on
pub trait LabelBackend: Send + Sync {
    /// Whether the host enforces or at least supports labeling
    fn labeling_enabled(&self) -> bool;

    /// Stamp a single path (not following symlinks)
    fn set_path_label(&self, path: &Path, label: &str) -> io::Result<()>;

    /// Read a single path's label (not following symlinks)
    fn path_label(&self, path: &Path) -> io::Result<String>;

    fn set_channel_label(&self, channel: Channel, label: &str) -> io::Result<()>;

    fn channel_label(&self, channel: Channel) -> io::Result<String>;

    /// Home directories that must never be relabeled wholesale
    fn home_directories(&self) -> Vec<PathBuf>;
}

/// Whether an error means "this filesystem cannot hold labels"
pub fn is_unsupported(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::Unsupported {
        return true;
    }
    matches!(err.raw_os_error(), Some(code) if code == libc::ENOTSUP || code == libc::EOPNOTSUPP)
}
