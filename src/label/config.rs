//! Label configuration
//!
//! The contexts a host designates for containers normally come from the
//! policy's `contexts/lxc_contexts` file:
//!
//! ```text
//! process = "system_u:system_r:container_t:s0"
//! file = "system_u:object_r:container_file_t:s0"
//! ro_file = "system_u:object_r:container_ro_file_t:s0"
//! ```
//!
//! [`LabelConfig::load_host`] reads that file for the active policy and falls
//! back to the built-in defaults when it is missing.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::allocator::DEFAULT_CATEGORY_UNIVERSE;
use super::context::{SecurityContext, MAX_CATEGORY};
use super::error::{LabelError, Result};

/// Main SELinux configuration file
const SELINUX_CONFIG: &str = "/etc/selinux/config";

/// Directory holding one subdirectory per policy type
const SELINUX_DIR: &str = "/etc/selinux";

/// Paths that are never relabeled as a whole
pub const DEFAULT_PROTECTED_PATHS: &[&str] = &[
    "/",
    "/bin",
    "/boot",
    "/dev",
    "/etc",
    "/etc/passwd",
    "/etc/pki",
    "/etc/shadow",
    "/home",
    "/lib",
    "/lib64",
    "/media",
    "/opt",
    "/proc",
    "/root",
    "/run",
    "/sbin",
    "/srv",
    "/sys",
    "/tmp",
    "/usr",
    "/var",
    "/var/lib",
    "/var/log",
];

/// Contexts and limits used when labeling containers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    /// Template for container processes
    pub process_label: String,
    /// Template for container files (mount label)
    pub file_label: String,
    /// Context for read-only mounted content
    pub ro_file_label: String,
    /// Number of categories available to the allocator
    pub category_universe: u32,
    /// Exact-match deny list for relabeling
    pub protected_paths: Vec<PathBuf>,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            process_label: "system_u:system_r:container_t:s0".to_string(),
            file_label: "system_u:object_r:container_file_t:s0".to_string(),
            ro_file_label: "system_u:object_r:container_ro_file_t:s0".to_string(),
            category_universe: DEFAULT_CATEGORY_UNIVERSE,
            protected_paths: DEFAULT_PROTECTED_PATHS.iter().map(PathBuf::from).collect(),
        }
    }
}

impl LabelConfig {
    /// Check that every template is a well-formed context
    pub fn validate(&self) -> Result<()> {
        for label in [&self.process_label, &self.file_label, &self.ro_file_label] {
            label.parse::<SecurityContext>()?;
        }
        if self.category_universe < 2 {
            return Err(LabelError::Config(format!(
                "category universe of {} cannot hold a category pair",
                self.category_universe
            )));
        }
        if self.category_universe > MAX_CATEGORY {
            return Err(LabelError::Config(format!(
                "category universe of {} exceeds the {} categories a context can name",
                self.category_universe, MAX_CATEGORY
            )));
        }
        Ok(())
    }

    /// Load a JSON configuration file; missing fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| LabelError::io_at(path, e))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| LabelError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay the contexts found in an `lxc_contexts` file onto the defaults
    pub fn from_lxc_contexts(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| LabelError::io_at(path, e))?;
        let config = Self::default().with_lxc_contexts(&raw);
        config.validate()?;
        Ok(config)
    }

    fn with_lxc_contexts(mut self, raw: &str) -> Self {
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').to_string();
            match key.trim() {
                "process" => self.process_label = value,
                "file" => self.file_label = value,
                "ro_file" => self.ro_file_label = value,
                _ => {}
            }
        }
        self
    }

    /// Configuration for the policy the host is running
    ///
    /// Never fails: an unreadable or invalid policy file is logged and the
    /// defaults are used instead.
    pub fn load_host() -> Self {
        let policy = fs::read_to_string(SELINUX_CONFIG)
            .ok()
            .and_then(|raw| policy_type(&raw));

        let Some(policy) = policy else {
            debug!("no SELINUXTYPE configured, using default container contexts");
            return Self::default();
        };

        let lxc_contexts = Path::new(SELINUX_DIR)
            .join(&policy)
            .join("contexts")
            .join("lxc_contexts");

        match Self::from_lxc_contexts(&lxc_contexts) {
            Ok(config) => {
                debug!(policy = %policy, "loaded container contexts");
                config
            }
            Err(e) => {
                warn!(policy = %policy, error = %e, "falling back to default container contexts");
                Self::default()
            }
        }
    }
}

/// Extract `SELINUXTYPE=` from the main SELinux config
fn policy_type(raw: &str) -> Option<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .find_map(|line| line.strip_prefix("SELINUXTYPE="))
        .map(|value| value.trim().trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = LabelConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.category_universe, 1024);
        assert!(config.protected_paths.contains(&PathBuf::from("/usr")));
    }

    #[test]
    fn test_lxc_contexts_overlay() {
        let raw = r#"
# container contexts
process = "system_u:system_r:svirt_lxc_net_t:s0"
file = "system_u:object_r:svirt_sandbox_file_t:s0"
content = "system_u:object_r:virt_var_lib_t:s0"
"#;
        let config = LabelConfig::default().with_lxc_contexts(raw);
        assert_eq!(config.process_label, "system_u:system_r:svirt_lxc_net_t:s0");
        assert_eq!(config.file_label, "system_u:object_r:svirt_sandbox_file_t:s0");
        assert_eq!(config.ro_file_label, LabelConfig::default().ro_file_label);
    }

    #[test]
    fn test_policy_type() {
        let raw = "# comment\nSELINUX=enforcing\nSELINUXTYPE=targeted\n";
        assert_eq!(policy_type(raw).as_deref(), Some("targeted"));
        assert_eq!(policy_type("SELINUX=disabled\n"), None);
        assert_eq!(policy_type("SELINUXTYPE=\n"), None);
    }

    #[test]
    fn test_json_file_with_partial_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"process_label": "system_u:system_r:spc_t:s0", "category_universe": 256}}"#
        )
        .unwrap();

        let config = LabelConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.process_label, "system_u:system_r:spc_t:s0");
        assert_eq!(config.category_universe, 256);
        assert_eq!(config.file_label, LabelConfig::default().file_label);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = LabelConfig {
            process_label: "broken".to_string(),
            ..LabelConfig::default()
        };
        assert!(matches!(config.validate(), Err(LabelError::MalformedContext(_))));

        let config = LabelConfig {
            category_universe: 1,
            ..LabelConfig::default()
        };
        assert!(matches!(config.validate(), Err(LabelError::Config(_))));

        let config = LabelConfig {
            category_universe: 1_000_000,
            ..LabelConfig::default()
        };
        assert!(matches!(config.validate(), Err(LabelError::Config(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = LabelConfig::from_lxc_contexts("/nonexistent/lxc_contexts").unwrap_err();
        assert!(matches!(err, LabelError::Io { path: Some(_), .. }));
    }
}
