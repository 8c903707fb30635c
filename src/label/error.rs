//! Error type shared by the labeling modules

use std::io;
use std::path::PathBuf;

/// Error type for labeling operations
#[derive(Debug)]
pub enum LabelError {
    /// A security context string could not be parsed
    MalformedContext(String),
    /// A labeling option had an unknown key or a bad value
    MalformedOption(String),
    /// A mount directive contained something other than `z`/`Z`
    IncompatibleLabel(String),
    /// No free category pair is left for this sensitivity
    CategoryExhausted { level: String },
    /// Relabeling target is a protected system path
    ProtectedPath(PathBuf),
    /// The host has no labeling support
    LabelingUnavailable,
    /// Configuration file could not be read or understood
    Config(String),
    /// I/O error from the labeling backend
    Io {
        path: Option<PathBuf>,
        source: io::Error,
    },
}

impl LabelError {
    pub(crate) fn io_at(path: impl Into<PathBuf>, source: io::Error) -> Self {
        LabelError::Io {
            path: Some(path.into()),
            source,
        }
    }
}

impl std::fmt::Display for LabelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LabelError::MalformedContext(ctx) => write!(f, "malformed security context {:?}", ctx),
            LabelError::MalformedOption(opt) => write!(
                f,
                "bad label option {:?}, valid options are 'disable' or one of \
                 'user, role, type, level, range, filetype' followed by ':' and a value",
                opt
            ),
            LabelError::IncompatibleLabel(directive) => {
                write!(f, "bad mount label directive {:?}, only 'z' and 'Z' are allowed", directive)
            }
            LabelError::CategoryExhausted { level } => {
                write!(f, "no free categories left for sensitivity {}", level)
            }
            LabelError::ProtectedPath(path) => {
                write!(f, "relabeling of {} is not allowed", path.display())
            }
            LabelError::LabelingUnavailable => write!(f, "labeling is not supported on this host"),
            LabelError::Config(msg) => write!(f, "label configuration error: {}", msg),
            LabelError::Io { path: Some(path), source } => {
                write!(f, "{}: {}", path.display(), source)
            }
            LabelError::Io { path: None, source } => write!(f, "{}", source),
        }
    }
}

impl std::error::Error for LabelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LabelError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for LabelError {
    fn from(e: io::Error) -> Self {
        LabelError::Io { path: None, source: e }
    }
}

/// Result alias used throughout the label module
pub type Result<T> = std::result::Result<T, LabelError>;
