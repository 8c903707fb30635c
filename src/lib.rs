//! seclabel - SELinux security contexts for container runtimes
//!
//! This library decides which MAC labels a container runs under and applies
//! them to the host: it parses contexts, hands out collision-free category
//! pairs, derives process and mount labels, relabels bind-mounted trees and
//! sets the per-thread creation labels used for sockets and keyrings.
//!
//! # Modules
//!
//! - `label` - Contexts, category allocation, label policy, relabeling
//! - `metrics` - Prometheus metrics for observability
//! - `telemetry` - `tracing` subscriber setup
//!
//! # Quick Start
//!
//! ```ignore
//! use seclabel::Labeler;
//!
//! let labeler = Labeler::host();
//!
//! // Fresh categories for a new container
//! let (process_label, mount_label) = labeler.init_labels(&["type:container_t"])?;
//!
//! // Private volume: only this container may use it
//! labeler.relabeler().relabel("/srv/volumes/app", &mount_label, false)?;
//!
//! // When the container is gone
//! labeler.release_labels(&process_label)?;
//! ```

pub mod label;
pub mod metrics;
pub mod telemetry;

// Re-export commonly used types at crate root for convenience
pub use label::{
    CategoryAllocator, ChannelLabels, LabelConfig, LabelError, Labeler, Relabeler, SecurityContext,
};
