//! In-memory labeling backend
//!
//! Keeps path and channel labels in hash maps instead of the kernel. Paths
//! can be marked as living on a filesystem without label support, or as
//! failing outright, to exercise the relabel walk's error handling.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::backend::{Channel, LabelBackend};

#[derive(Default)]
struct MemoryState {
    paths: HashMap<PathBuf, String>,
    channels: HashMap<Channel, String>,
    unsupported: HashSet<PathBuf>,
    failing: HashSet<PathBuf>,
}

/// Labeling backend backed by process memory
pub struct MemoryBackend {
    enabled: bool,
    homes: Vec<PathBuf>,
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    /// Backend that behaves like a labeling-enabled host with no home directory
    pub fn new() -> Self {
        Self {
            enabled: true,
            homes: Vec::new(),
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Backend that behaves like a host without labeling support
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new()
        }
    }

    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.homes.push(home.into());
        self
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make labeling `path` fail with `EOPNOTSUPP`
    pub fn mark_unsupported(&self, path: impl Into<PathBuf>) {
        self.state().unsupported.insert(path.into());
    }

    /// Make labeling `path` fail with `EACCES`
    pub fn mark_failing(&self, path: impl Into<PathBuf>) {
        self.state().failing.insert(path.into());
    }

    /// Snapshot of every labeled path
    pub fn labeled_paths(&self) -> HashMap<PathBuf, String> {
        self.state().paths.clone()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LabelBackend for MemoryBackend {
    fn labeling_enabled(&self) -> bool {
        self.enabled
    }

    fn set_path_label(&self, path: &Path, label: &str) -> io::Result<()> {
        let mut state = self.state();
        if state.unsupported.contains(path) {
            return Err(io::Error::from_raw_os_error(libc::EOPNOTSUPP));
        }
        if state.failing.contains(path) {
            return Err(io::Error::from_raw_os_error(libc::EACCES));
        }
        state.paths.insert(path.to_path_buf(), label.to_string());
        Ok(())
    }

    fn path_label(&self, path: &Path) -> io::Result<String> {
        self.state()
            .paths
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::from_raw_os_error(libc::ENODATA))
    }

    fn set_channel_label(&self, channel: Channel, label: &str) -> io::Result<()> {
        let mut state = self.state();
        if label.is_empty() {
            state.channels.remove(&channel);
        } else {
            state.channels.insert(channel, label.to_string());
        }
        Ok(())
    }

    fn channel_label(&self, channel: Channel) -> io::Result<String> {
        Ok(self.state().channels.get(&channel).cloned().unwrap_or_default())
    }

    fn home_directories(&self) -> Vec<PathBuf> {
        self.homes.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_labels() {
        let backend = MemoryBackend::new();
        let path = Path::new("/data/a");

        assert!(backend.path_label(path).is_err());
        backend.set_path_label(path, "u:r:t:s0").unwrap();
        assert_eq!(backend.path_label(path).unwrap(), "u:r:t:s0");
    }

    #[test]
    fn test_injected_failures() {
        let backend = MemoryBackend::new();
        backend.mark_unsupported("/proc/x");
        backend.mark_failing("/data/locked");

        let err = backend.set_path_label(Path::new("/proc/x"), "u:r:t").unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EOPNOTSUPP));

        let err = backend.set_path_label(Path::new("/data/locked"), "u:r:t").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_channels_are_independent() {
        let backend = MemoryBackend::new();
        backend.set_channel_label(Channel::SockCreate, "a:b:c").unwrap();
        assert_eq!(backend.channel_label(Channel::SockCreate).unwrap(), "a:b:c");
        assert_eq!(backend.channel_label(Channel::KeyCreate).unwrap(), "");

        backend.set_channel_label(Channel::SockCreate, "").unwrap();
        assert_eq!(backend.channel_label(Channel::SockCreate).unwrap(), "");
    }
}
