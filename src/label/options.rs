//! Labeling options and mount directives
//!
//! Options arrive as strings (`user:user_u`, `level:s0:c1,c2`, `disable`) and
//! are parsed once into [`LabelOption`] so the policy never dispatches on raw
//! keys.

use std::fmt;
use std::str::FromStr;

use super::context::{MlsRange, SecurityContext};
use super::error::{LabelError, Result};

/// A single declarative labeling option
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelOption {
    User(String),
    Role(String),
    Type(String),
    Level(String),
    /// Alias of `Level`
    Range(String),
    /// Type of the file (mount) context
    Filetype(String),
    /// Opt out of labeling for this container
    Disable,
}

impl LabelOption {
    /// Parse a whole option list, failing on the first bad entry
    pub fn parse_all<S: AsRef<str>>(options: &[S]) -> Result<Vec<LabelOption>> {
        options.iter().map(|opt| opt.as_ref().parse()).collect()
    }
}

impl FromStr for LabelOption {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self> {
        if s == "disable" {
            return Ok(LabelOption::Disable);
        }

        let malformed = || LabelError::MalformedOption(s.to_string());
        let (key, value) = s.split_once(':').ok_or_else(malformed)?;
        if value.is_empty() {
            return Err(malformed());
        }

        let value = value.to_string();
        match key {
            "user" => Ok(LabelOption::User(value)),
            "role" => Ok(LabelOption::Role(value)),
            "type" => Ok(LabelOption::Type(value)),
            "filetype" => Ok(LabelOption::Filetype(value)),
            "level" | "range" => {
                value.parse::<MlsRange>().map_err(|_| malformed())?;
                if key == "level" {
                    Ok(LabelOption::Level(value))
                } else {
                    Ok(LabelOption::Range(value))
                }
            }
            _ => Err(malformed()),
        }
    }
}

impl fmt::Display for LabelOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelOption::User(v) => write!(f, "user:{}", v),
            LabelOption::Role(v) => write!(f, "role:{}", v),
            LabelOption::Type(v) => write!(f, "type:{}", v),
            LabelOption::Level(v) => write!(f, "level:{}", v),
            LabelOption::Range(v) => write!(f, "range:{}", v),
            LabelOption::Filetype(v) => write!(f, "filetype:{}", v),
            LabelOption::Disable => f.write_str("disable"),
        }
    }
}

/// Decompose a context into the options that reproduce it
///
/// Lets a second container take on a label it was shown. An empty context
/// yields no options.
pub fn dup_sec_opt(context: &str) -> Result<Vec<String>> {
    if context.is_empty() {
        return Ok(Vec::new());
    }

    let ctx: SecurityContext = context.parse()?;
    let mut dup = vec![
        LabelOption::User(ctx.user),
        LabelOption::Role(ctx.role),
        LabelOption::Type(ctx.setype),
    ];
    if !ctx.range.is_empty() {
        dup.push(LabelOption::Level(ctx.range));
    }

    Ok(dup.iter().map(ToString::to_string).collect())
}

/// The canonical opt-out option list
pub fn disable_sec_opt() -> Vec<String> {
    vec![LabelOption::Disable.to_string()]
}

/// Whether a mount directive asks for a shared label (`z`)
pub fn is_shared(directive: &str) -> bool {
    directive.contains('z')
}

/// Check that a mount directive only uses `z` and `Z`
///
/// `zZ` is accepted and treated as shared, see [`is_shared`].
pub fn validate(directive: &str) -> Result<()> {
    if directive.chars().all(|c| c == 'z' || c == 'Z') {
        Ok(())
    } else {
        Err(LabelError::IncompatibleLabel(directive.to_string()))
    }
}

/// Add a `context="..."` mount option for the given label
pub fn format_mount_label(src: &str, mount_label: &str) -> String {
    if mount_label.is_empty() {
        return src.to_string();
    }
    if src.is_empty() {
        format!("context=\"{}\"", mount_label)
    } else {
        format!("{},context=\"{}\"", src, mount_label)
    }
}
