//! Per-thread creation labels
//!
//! The kernel tags sockets, keyrings, files and exec'd programs created by a
//! thread with whatever label sits in the matching `/proc/thread-self/attr`
//! file. Writes are refused on hosts without labeling; reads report "no
//! label" there instead of failing.

use std::sync::Arc;

use tracing::debug;

use super::backend::{Channel, LabelBackend};
use super::context::SecurityContext;
use super::error::{LabelError, Result};

/// Get/set access to the calling thread's creation labels
pub struct ChannelLabels {
    backend: Arc<dyn LabelBackend>,
}

impl ChannelLabels {
    pub fn new(backend: Arc<dyn LabelBackend>) -> Self {
        Self { backend }
    }

    /// Write a channel label; an empty label resets the channel
    pub fn set(&self, channel: Channel, label: &str) -> Result<()> {
        if !self.backend.labeling_enabled() {
            return Err(LabelError::LabelingUnavailable);
        }
        if !label.is_empty() {
            label.parse::<SecurityContext>()?;
        }

        self.backend
            .set_channel_label(channel, label)
            .map_err(|e| LabelError::Io { path: None, source: e })?;
        debug!(channel = %channel, label, "set creation label");
        Ok(())
    }

    /// Read a channel label; empty when none is set or labeling is absent
    pub fn get(&self, channel: Channel) -> Result<String> {
        if !self.backend.labeling_enabled() {
            return Ok(String::new());
        }
        Ok(self.backend.channel_label(channel)?)
    }

    pub fn set_socket_label(&self, label: &str) -> Result<()> {
        self.set(Channel::SockCreate, label)
    }

    pub fn socket_label(&self) -> Result<String> {
        self.get(Channel::SockCreate)
    }

    pub fn set_key_label(&self, label: &str) -> Result<()> {
        self.set(Channel::KeyCreate, label)
    }

    pub fn key_label(&self) -> Result<String> {
        self.get(Channel::KeyCreate)
    }

    pub fn set_exec_label(&self, label: &str) -> Result<()> {
        self.set(Channel::Exec, label)
    }

    pub fn exec_label(&self) -> Result<String> {
        self.get(Channel::Exec)
    }

    pub fn set_fscreate_label(&self, label: &str) -> Result<()> {
        self.set(Channel::FsCreate, label)
    }

    pub fn fscreate_label(&self) -> Result<String> {
        self.get(Channel::FsCreate)
    }
}
