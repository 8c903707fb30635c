//! Container label policy
//!
//! Turns a list of declarative options into the pair of contexts a container
//! runs under:
//!
//! ```text
//! options ──► parse ──► templates ──► apply options ──► categories ──► (process, mount)
//!                        │                                 │
//!                        │ process: system_u:system_r:container_t:s0
//!                        │ file:    system_u:object_r:container_file_t:s0
//!                        │                                 │
//!                        └─────────────────────────────────┴─ reserve() unless
//!                                                             a level was given
//! ```
//!
//! Both contexts always end up with the same range, otherwise the container
//! could not read its own files.

use std::sync::Arc;

use tracing::{debug, info};

use super::allocator::CategoryAllocator;
use super::backend::LabelBackend;
use super::channel::ChannelLabels;
use super::config::LabelConfig;
use super::context::{Level, SecurityContext};
use super::error::Result;
use super::host::HostBackend;
use super::options::LabelOption;
use super::relabel::Relabeler;

/// Derives container labels from options and owns the pieces they need
pub struct Labeler {
    config: LabelConfig,
    allocator: Arc<CategoryAllocator>,
    backend: Arc<dyn LabelBackend>,
}

impl Labeler {
    /// Labeler with its own category pool sized from `config`
    pub fn new(config: LabelConfig, backend: Arc<dyn LabelBackend>) -> Result<Self> {
        config.validate()?;
        let allocator = Arc::new(CategoryAllocator::with_universe(config.category_universe));
        Ok(Self {
            config,
            allocator,
            backend,
        })
    }

    /// Labeler for the running host, sharing the process-wide category pool
    pub fn host() -> Self {
        Self {
            config: LabelConfig::load_host(),
            allocator: CategoryAllocator::global(),
            backend: Arc::new(HostBackend::new()),
        }
    }

    /// Share a category pool with other labelers
    pub fn with_allocator(mut self, allocator: Arc<CategoryAllocator>) -> Self {
        self.allocator = allocator;
        self
    }

    pub fn config(&self) -> &LabelConfig {
        &self.config
    }

    pub fn allocator(&self) -> &Arc<CategoryAllocator> {
        &self.allocator
    }

    /// Relabel engine using this labeler's backend and deny list
    pub fn relabeler(&self) -> Relabeler {
        Relabeler::new(Arc::clone(&self.backend), self.config.protected_paths.clone())
    }

    /// Creation-label access using this labeler's backend
    pub fn channels(&self) -> ChannelLabels {
        ChannelLabels::new(Arc::clone(&self.backend))
    }

    /// Compute `(process_label, mount_label)` for a container
    ///
    /// Every option is parsed before anything else happens, so one bad entry
    /// fails the whole call. `disable`, or a host without labeling, yields
    /// two empty labels and leaves the allocator alone.
    pub fn init_labels<S: AsRef<str>>(&self, options: &[S]) -> Result<(String, String)> {
        let options = LabelOption::parse_all(options)?;

        if !self.backend.labeling_enabled() || options.contains(&LabelOption::Disable) {
            debug!("labeling disabled for this container");
            return Ok((String::new(), String::new()));
        }

        let mut process: SecurityContext = self.config.process_label.parse()?;
        let mut file: SecurityContext = self.config.file_label.parse()?;
        let mut explicit_level = None;

        for option in options {
            match option {
                LabelOption::User(user) => {
                    process.user = user.clone();
                    file.user = user;
                }
                LabelOption::Role(role) => process.role = role,
                LabelOption::Type(setype) => process.setype = setype,
                LabelOption::Filetype(setype) => file.setype = setype,
                LabelOption::Level(level) | LabelOption::Range(level) => {
                    explicit_level = Some(level)
                }
                LabelOption::Disable => {}
            }
        }

        match explicit_level {
            Some(level) => {
                process.range = level.clone();
                file.range = level;
                // Keep automatic reservations clear of the caller's categories
                self.allocator.reserve_label(&process.to_string())?;
            }
            // Non-MLS template: nothing to allocate
            None if process.range.is_empty() => {}
            None => {
                let sensitivity = process.sensitivity().to_string();
                let categories = self.allocator.reserve(&sensitivity)?;
                let range = Level::new(sensitivity, categories).to_string();
                process.range = range.clone();
                file.range = range;
            }
        }

        let (process, file) = (process.to_string(), file.to_string());
        info!(process_label = %process, mount_label = %file, "container labels initialized");
        Ok((process, file))
    }

    /// Context for read-only mounted content; empty without labeling
    pub fn ro_mount_label(&self) -> String {
        if !self.backend.labeling_enabled() {
            return String::new();
        }
        self.config.ro_file_label.clone()
    }

    /// Hand a container's categories back once it is gone
    pub fn release_labels(&self, process_label: &str) -> Result<()> {
        self.allocator.release_label(process_label)
    }

    /// Re-register the categories of a container that is already running
    pub fn reserve_labels(&self, process_label: &str) -> Result<()> {
        self.allocator.reserve_label(process_label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label::error::LabelError;
    use crate::label::memory::MemoryBackend;
    use crate::label::options::dup_sec_opt;

    fn labeler() -> Labeler {
        Labeler::new(LabelConfig::default(), Arc::new(MemoryBackend::new())).unwrap()
    }

    #[test]
    fn test_defaults_get_fresh_categories() {
        let labeler = labeler();
        let (process, mount) = labeler.init_labels::<&str>(&[]).unwrap();

        assert_eq!(process, "system_u:system_r:container_t:s0:c0,c1");
        assert_eq!(mount, "system_u:object_r:container_file_t:s0:c0,c1");

        let (second, _) = labeler.init_labels::<&str>(&[]).unwrap();
        assert_eq!(second, "system_u:system_r:container_t:s0:c2,c3");
    }

    #[test]
    fn test_user_options() {
        let labeler = labeler();
        let (process, mount) = labeler
            .init_labels(&["user:user_u", "role:user_r", "type:user_t", "level:s0:c1,c15"])
            .unwrap();

        assert_eq!(process, "user_u:user_r:user_t:s0:c1,c15");
        assert_eq!(mount, "user_u:object_r:container_file_t:s0:c1,c15");
    }

    #[test]
    fn test_filetype_option() {
        let labeler = labeler();
        let (_, mount) = labeler
            .init_labels(&["filetype:test_file_t", "level:s0:c1,c15"])
            .unwrap();
        assert_eq!(mount, "system_u:object_r:test_file_t:s0:c1,c15");
    }

    #[test]
    fn test_range_is_alias_of_level() {
        let (process, mount) = labeler().init_labels(&["range:s0:c7,c8"]).unwrap();
        assert!(process.ends_with(":s0:c7,c8"));
        assert!(mount.ends_with(":s0:c7,c8"));
    }

    #[test]
    fn test_explicit_level_is_kept_out_of_pool() {
        let labeler = labeler();
        labeler.init_labels(&["level:s0:c0,c1"]).unwrap();
        let (process, _) = labeler.init_labels::<&str>(&[]).unwrap();
        assert_eq!(process, "system_u:system_r:container_t:s0:c2,c3");
    }

    #[test]
    fn test_explicit_level_does_not_reserve_fresh_pair() {
        let labeler = labeler();
        labeler.init_labels(&["level:s0"]).unwrap();
        assert_eq!(labeler.allocator().in_use("s0"), 0);
    }

    #[test]
    fn test_disable() {
        let labeler = labeler();
        let labels = labeler.init_labels(&["disable"]).unwrap();
        assert_eq!(labels, (String::new(), String::new()));
        assert_eq!(labeler.allocator().in_use("s0"), 0);
    }

    #[test]
    fn test_bad_option_fails_whole_call() {
        let labeler = labeler();
        let err = labeler
            .init_labels(&["user", "role:user_r", "type:user_t", "level:s0:c1,c15"])
            .unwrap_err();
        assert!(matches!(err, LabelError::MalformedOption(_)));

        let err = labeler
            .init_labels(&["user:user_u", "role:user_r", "flavor:mint"])
            .unwrap_err();
        assert!(matches!(err, LabelError::MalformedOption(_)));
        assert_eq!(labeler.allocator().in_use("s0"), 0);
    }

    #[test]
    fn test_disabled_host() {
        let labeler = Labeler::new(LabelConfig::default(), Arc::new(MemoryBackend::disabled())).unwrap();
        assert_eq!(labeler.init_labels::<&str>(&[]).unwrap(), (String::new(), String::new()));
        assert_eq!(labeler.ro_mount_label(), "");
        assert_eq!(labeler.allocator().in_use("s0"), 0);
    }

    #[test]
    fn test_ro_mount_label() {
        assert_eq!(labeler().ro_mount_label(), "system_u:object_r:container_ro_file_t:s0");
    }

    #[test]
    fn test_exhaustion_surfaces() {
        let config = LabelConfig {
            category_universe: 3,
            ..LabelConfig::default()
        };
        let labeler = Labeler::new(config, Arc::new(MemoryBackend::new())).unwrap();
        labeler.init_labels::<&str>(&[]).unwrap();
        assert!(matches!(
            labeler.init_labels::<&str>(&[]),
            Err(LabelError::CategoryExhausted { .. })
        ));
    }

    #[test]
    fn test_release_returns_categories() {
        let labeler = labeler();
        let (process, _) = labeler.init_labels::<&str>(&[]).unwrap();
        labeler.release_labels(&process).unwrap();
        assert_eq!(labeler.allocator().in_use("s0"), 0);

        let (again, _) = labeler.init_labels::<&str>(&[]).unwrap();
        assert_eq!(again, process);
    }

    #[test]
    fn test_reserve_labels_after_restart() {
        let labeler = labeler();
        labeler
            .reserve_labels("system_u:system_r:container_t:s0:c0,c1")
            .unwrap();
        let (process, _) = labeler.init_labels::<&str>(&[]).unwrap();
        assert_eq!(process, "system_u:system_r:container_t:s0:c2,c3");
    }

    #[test]
    fn test_shared_allocator() {
        let pool = Arc::new(CategoryAllocator::new());
        let a = labeler().with_allocator(Arc::clone(&pool));
        let b = labeler().with_allocator(Arc::clone(&pool));

        let (pa, _) = a.init_labels::<&str>(&[]).unwrap();
        let (pb, _) = b.init_labels::<&str>(&[]).unwrap();
        assert_ne!(pa, pb);
        assert_eq!(pool.in_use("s0"), 4);
    }

    #[test]
    fn test_oversized_level_is_rejected() {
        let labeler = labeler();
        for opt in ["level:s0:c0.c20000000", "level:s0:c0.c4294967295"] {
            assert!(matches!(
                labeler.init_labels(&[opt]),
                Err(LabelError::MalformedOption(_))
            ));
        }
        assert_eq!(labeler.allocator().in_use("s0"), 0);
    }

    #[test]
    fn test_replayed_label_keeps_categories_after_original_release() {
        let labeler = labeler();
        let (first, _) = labeler.init_labels::<&str>(&[]).unwrap();

        let dup = dup_sec_opt(&first).unwrap();
        let (replayed, _) = labeler.init_labels(dup.as_slice()).unwrap();
        assert_eq!(replayed, first);

        labeler.release_labels(&first).unwrap();
        let (third, _) = labeler.init_labels::<&str>(&[]).unwrap();
        assert_eq!(third, "system_u:system_r:container_t:s0:c2,c3");
    }

    #[test]
    fn test_replay_mls_span() {
        let labeler = labeler();
        let label = "unconfined_u:unconfined_r:unconfined_t:s0-s0:c0.c1023";

        let dup = dup_sec_opt(label).unwrap();
        let (process, mount) = labeler.init_labels(dup.as_slice()).unwrap();
        assert_eq!(process, label);
        assert_eq!(mount, "unconfined_u:object_r:container_file_t:s0-s0:c0.c1023");

        // The low level carries no categories, so the pool is untouched
        assert_eq!(labeler.allocator().in_use("s0"), 0);
    }

    #[test]
    fn test_non_mls_template() {
        let config = LabelConfig {
            process_label: "system_u:system_r:container_t".to_string(),
            file_label: "system_u:object_r:container_file_t".to_string(),
            ..LabelConfig::default()
        };
        let labeler = Labeler::new(config, Arc::new(MemoryBackend::new())).unwrap();
        let (process, mount) = labeler.init_labels::<&str>(&[]).unwrap();
        assert_eq!(process, "system_u:system_r:container_t");
        assert_eq!(mount, "system_u:object_r:container_file_t");
    }
}
