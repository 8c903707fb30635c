//! MAC labeling for containers
//!
//! This module provides everything needed to run a container under its own
//! SELinux label:
//! - Context parsing (`user:role:type[:range]`) and option handling
//! - Collision-free category allocation (MCS pairs)
//! - Process/mount label derivation from declarative options
//! - Relabeling of bind-mounted trees, with a protected-path guard
//! - Socket/keyring/exec creation labels
//!
//! # Typical Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  Labeler::init_labels(["type:container_t"])                     │
//! │        │                                                        │
//! │        ├─► CategoryAllocator::reserve("s0") ──► c4,c5           │
//! │        ▼                                                        │
//! │  process: system_u:system_r:container_t:s0:c4,c5               │
//! │  mount:   system_u:object_r:container_file_t:s0:c4,c5          │
//! └─────────────────────────────────────────────────────────────────┘
//!          │                                   │
//!          ▼                                   ▼
//!   Relabeler::relabel(volume, mount)   ChannelLabels::set_exec_label(process)
//! ```
//!
//! On hosts without labeling support everything degrades to a no-op.

pub mod allocator;
pub mod backend;
pub mod channel;
pub mod config;
pub mod context;
pub mod error;
pub mod host;
pub mod memory;
pub mod options;
pub mod policy;
pub mod relabel;

pub use allocator::{CategoryAllocator, DEFAULT_CATEGORY_UNIVERSE};
pub use backend::{Channel, LabelBackend};
pub use channel::ChannelLabels;
pub use config::LabelConfig;
pub use context::{CategoryRange, Level, MlsRange, SecurityContext, MAX_CATEGORY};
pub use error::{LabelError, Result};
pub use host::HostBackend;
pub use memory::MemoryBackend;
pub use options::{disable_sec_opt, dup_sec_opt, format_mount_label, is_shared, validate, LabelOption};
pub use policy::Labeler;
pub use relabel::{RelabelReport, Relabeler};
