//! Kernel-backed labeling primitives
//!
//! # Where labels live
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  Files      │ xattr "security.selinux" (lsetxattr / lgetxattr)    │
//! ├─────────────┼────────────────────────────────────────────────────┤
//! │  Threads    │ /proc/thread-self/attr/{exec,sockcreate,keycreate, │
//! │             │                          fscreate}                 │
//! │             │ older kernels: /proc/self/task/<tid>/attr/...      │
//! ├─────────────┼────────────────────────────────────────────────────┤
//! │  Enabled?   │ selinuxfs mounted and our own context != "kernel"  │
//! └─────────────┴────────────────────────────────────────────────────┘
//! ```

use std::ffi::CString;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use nix::unistd::{gettid, User};
use tracing::debug;

use super::backend::{Channel, LabelBackend};

/// Extended attribute holding a file's security context
const SELINUX_XATTR: &str = "security.selinux";

/// Initial buffer for lgetxattr; contexts are almost always shorter
const XATTR_BUF_SIZE: usize = 256;

/// Labeling backend that talks to the running kernel
#[derive(Default)]
pub struct HostBackend {
    enabled: OnceLock<bool>,
}

impl HostBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn detect_enabled() -> bool {
        let mounted = fs::read_to_string("/proc/mounts")
            .map(|buf| buf.contains("selinuxfs"))
            .unwrap_or_default();
        if !mounted {
            return false;
        }

        // Under a disabled policy every task reports the "kernel" context.
        match fs::read_to_string("/proc/self/attr/current") {
            Ok(current) => {
                let current = trim_label(&current);
                !current.is_empty() && current != "kernel"
            }
            Err(_) => false,
        }
    }

    fn channel_path(channel: Channel) -> PathBuf {
        let path = Path::new("/proc/thread-self/attr").join(channel.attr_name());
        if path.exists() {
            return path;
        }
        // Fall back to the pre-4.1 layout
        Path::new("/proc/self/task")
            .join(gettid().to_string())
            .join("attr")
            .join(channel.attr_name())
    }
}

fn to_cstring(bytes: &[u8]) -> io::Result<CString> {
    CString::new(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

fn trim_label(raw: &str) -> &str {
    raw.trim_end_matches(['\0', '\n'])
}

impl LabelBackend for HostBackend {
    fn labeling_enabled(&self) -> bool {
        *self.enabled.get_or_init(Self::detect_enabled)
    }

    fn set_path_label(&self, path: &Path, label: &str) -> io::Result<()> {
        let c_path = to_cstring(path.as_os_str().as_bytes())?;
        let c_name = to_cstring(SELINUX_XATTR.as_bytes())?;

        let ret = unsafe {
            libc::lsetxattr(
                c_path.as_ptr(),
                c_name.as_ptr(),
                label.as_ptr() as *const libc::c_void,
                label.len(),
                0,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn path_label(&self, path: &Path) -> io::Result<String> {
        let c_path = to_cstring(path.as_os_str().as_bytes())?;
        let c_name = to_cstring(SELINUX_XATTR.as_bytes())?;
        let mut buf = vec![0u8; XATTR_BUF_SIZE];

        loop {
            let ret = unsafe {
                libc::lgetxattr(
                    c_path.as_ptr(),
                    c_name.as_ptr(),
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                )
            };
            if ret >= 0 {
                buf.truncate(ret as usize);
                let label = String::from_utf8_lossy(&buf);
                return Ok(trim_label(&label).to_string());
            }

            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ERANGE) {
                return Err(err);
            }

            // Buffer too small: ask the kernel for the real size and retry
            let needed = unsafe {
                libc::lgetxattr(c_path.as_ptr(), c_name.as_ptr(), std::ptr::null_mut(), 0)
            };
            if needed < 0 {
                return Err(io::Error::last_os_error());
            }
            buf.resize(needed as usize, 0);
        }
    }

    fn set_channel_label(&self, channel: Channel, label: &str) -> io::Result<()> {
        let path = Self::channel_path(channel);
        let mut file = OpenOptions::new().write(true).open(&path)?;

        if label.is_empty() {
            // A zero-length write resets the channel to the default
            file.write(&[])?;
        } else {
            file.write_all(label.as_bytes())?;
        }
        debug!(channel = %channel, label, "channel label written");
        Ok(())
    }

    fn channel_label(&self, channel: Channel) -> io::Result<String> {
        let raw = fs::read_to_string(Self::channel_path(channel))?;
        Ok(trim_label(&raw).to_string())
    }

    fn home_directories(&self) -> Vec<PathBuf> {
        let mut homes = Vec::new();

        if let Some(home) = std::env::var_os("HOME").filter(|h| !h.is_empty()) {
            homes.push(PathBuf::from(home));
        }

        // Under sudo, HOME may point at root's home; protect the caller's too
        if let Ok(sudo_user) = std::env::var("SUDO_USER") {
            if let Ok(Some(user)) = User::from_name(&sudo_user) {
                homes.push(user.dir);
            }
        }

        homes
    }
}
