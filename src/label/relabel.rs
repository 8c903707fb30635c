//! Relabeling of filesystem trees
//!
//! Bind-mounted host paths must carry the container's file context before
//! the container can touch them. This module stamps a context on every entry
//! under a path, after refusing paths whose relabeling would damage the host.
//!
//! # Shared vs private
//!
//! ```text
//! label = system_u:object_r:container_file_t:s0:c1,c2
//!
//!   private (Z) ──► ...:container_file_t:s0:c1,c2   only this container
//!   shared  (z) ──► ...:container_file_t:s0         any container_t process
//! ```
//!
//! A walk is not atomic: if it fails or the caller gives up on it, the tree
//! is left partially relabeled. Callers relabeling overlapping trees from
//! several threads must serialize those calls themselves.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::backend::{is_unsupported, LabelBackend};
use super::context::SecurityContext;
use super::error::{LabelError, Result};
use crate::metrics::{RELABEL_DENIED, RELABEL_ENTRIES};

/// Everything under this directory is off limits, not just the directory itself
const PROTECTED_TREE: &str = "/etc";

/// Outcome of a relabel walk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelabelReport {
    /// Entries that now carry the label
    pub labeled: usize,
    /// Entries on filesystems without label support
    pub skipped: usize,
}

/// Applies file contexts to paths and trees
pub struct Relabeler {
    backend: Arc<dyn LabelBackend>,
    protected: Vec<PathBuf>,
}

impl Relabeler {
    pub fn new(backend: Arc<dyn LabelBackend>, protected: Vec<PathBuf>) -> Self {
        Self { backend, protected }
    }

    /// Reject paths that must never be relabeled
    ///
    /// Returns the normalized absolute path on success.
    pub fn check_path(&self, path: &Path) -> Result<PathBuf> {
        let target = absolute(path)?;

        let homes = self.backend.home_directories();
        let denied = self.protected.iter().any(|p| normalize(p) == target)
            || homes.iter().any(|h| normalize(h) == target)
            || target.starts_with(PROTECTED_TREE);

        if denied {
            RELABEL_DENIED.inc();
            warn!(path = %target.display(), "refusing to relabel protected path");
            return Err(LabelError::ProtectedPath(target));
        }
        Ok(target)
    }

    /// Stamp `label` on `path` and everything below it
    ///
    /// An empty label, or a host without labeling, makes this a no-op.
    /// Entries on filesystems that cannot hold labels are skipped; any other
    /// failure stops the walk and is returned.
    pub fn relabel(&self, path: impl AsRef<Path>, label: &str, shared: bool) -> Result<RelabelReport> {
        if label.is_empty() || !self.backend.labeling_enabled() {
            return Ok(RelabelReport::default());
        }

        let root = self.check_path(path.as_ref())?;
        let label = if shared {
            shared_label(label)?
        } else {
            label.parse::<SecurityContext>()?;
            label.to_string()
        };

        let report = self.walk(&root, &label)?;
        info!(
            path = %root.display(),
            label = %label,
            shared,
            labeled = report.labeled,
            skipped = report.skipped,
            "relabel complete"
        );
        Ok(report)
    }

    fn walk(&self, root: &Path, label: &str) -> Result<RelabelReport> {
        let mut report = RelabelReport::default();
        let mut pending = vec![root.to_path_buf()];

        while let Some(path) = pending.pop() {
            match self.backend.set_path_label(&path, label) {
                Ok(()) => {
                    report.labeled += 1;
                    RELABEL_ENTRIES.with_label_values(&["labeled"]).inc();
                }
                Err(e) if is_unsupported(&e) => {
                    report.skipped += 1;
                    RELABEL_ENTRIES.with_label_values(&["skipped"]).inc();
                    debug!(path = %path.display(), "labels not supported, skipping");
                }
                Err(e) => return Err(LabelError::io_at(path, e)),
            }

            // symlink_metadata: never descend through a link
            let meta = fs::symlink_metadata(&path).map_err(|e| LabelError::io_at(&path, e))?;
            if meta.is_dir() {
                let entries = fs::read_dir(&path).map_err(|e| LabelError::io_at(&path, e))?;
                for entry in entries {
                    let entry = entry.map_err(|e| LabelError::io_at(&path, e))?;
                    pending.push(entry.path());
                }
            }
        }

        Ok(report)
    }

    /// Label a single path (no recursion), subject to the same guard
    pub fn set_file_label(&self, path: impl AsRef<Path>, label: &str) -> Result<()> {
        if label.is_empty() || !self.backend.labeling_enabled() {
            return Ok(());
        }
        let target = self.check_path(path.as_ref())?;
        label.parse::<SecurityContext>()?;
        self.backend
            .set_path_label(&target, label)
            .map_err(|e| LabelError::io_at(target, e))
    }

    /// Current label of a path; empty on hosts without labeling
    pub fn file_label(&self, path: impl AsRef<Path>) -> Result<String> {
        if !self.backend.labeling_enabled() {
            return Ok(String::new());
        }
        let path = path.as_ref();
        self.backend
            .path_label(path)
            .map_err(|e| LabelError::io_at(path, e))
    }
}

/// Drop the categories so every process of the type can use the files
fn shared_label(label: &str) -> Result<String> {
    let mut ctx: SecurityContext = label.parse()?;
    if !ctx.range.is_empty() {
        ctx.range = ctx.sensitivity().to_string();
    }
    Ok(ctx.to_string())
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(normalize(path));
    }
    let cwd = std::env::current_dir()?;
    Ok(normalize(&cwd.join(path)))
}

/// Lexical normalization: collapses `.`, `..`, repeated and trailing `/`
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::RootDir | Component::Prefix(_) => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}
