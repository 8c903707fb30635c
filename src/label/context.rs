//! Security context strings
//!
//! A context has the shape `user:role:type[:range]`, where the range is a
//! sensitivity optionally followed by a category set:
//!
//! ```text
//! system_u:system_r:container_t:s0:c1,c2
//! └──┬───┘ └──┬───┘ └────┬────┘ └──┬───┘
//!   user     role      type      range = sensitivity ":" categories
//! ```
//!
//! Categories are written as `cN` tokens joined by `,` (discrete) or `.`
//! (inclusive span), e.g. `c0.c3,c7`. Indices outside `0..MAX_CATEGORY` are
//! rejected before any span is expanded.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use super::error::{LabelError, Result};

/// Size of the category space (`c0` through `c1023`)
pub const MAX_CATEGORY: u32 = 1024;

/// A parsed `user:role:type[:range]` security context
///
/// The range is kept verbatim so that MLS spans like `s0-s0:c0.c1023`
/// survive a round trip untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecurityContext {
    pub user: String,
    pub role: String,
    pub setype: String,
    pub range: String,
}

impl SecurityContext {
    pub fn new(
        user: impl Into<String>,
        role: impl Into<String>,
        setype: impl Into<String>,
        range: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            role: role.into(),
            setype: setype.into(),
            range: range.into(),
        }
    }

    /// Sensitivity part of the range (`s0` for `s0:c1,c2`, `s0` for `s0-s0:c0.c1023`)
    pub fn sensitivity(&self) -> &str {
        let end = self
            .range
            .find(|c| c == ':' || c == '-')
            .unwrap_or(self.range.len());
        &self.range[..end]
    }

    /// Parse the range as a single level, if there is one
    pub fn level(&self) -> Result<Option<Level>> {
        if self.range.is_empty() {
            return Ok(None);
        }
        self.range.parse::<Level>().map(Some)
    }

    /// Parse the range as `low[-high]`, if there is one
    pub fn mls_range(&self) -> Result<Option<MlsRange>> {
        if self.range.is_empty() {
            return Ok(None);
        }
        self.range.parse::<MlsRange>().map(Some)
    }
}

impl fmt::Display for SecurityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.user, self.role, self.setype)?;
        if !self.range.is_empty() {
            write!(f, ":{}", self.range)?;
        }
        Ok(())
    }
}

impl FromStr for SecurityContext {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self> {
        if s.contains('\0') {
            return Err(LabelError::MalformedContext(s.to_string()));
        }

        let fields: Vec<&str> = s.splitn(4, ':').collect();
        if fields.len() < 3 || fields[..3].iter().any(|f| f.is_empty()) {
            return Err(LabelError::MalformedContext(s.to_string()));
        }

        Ok(Self {
            user: fields[0].to_string(),
            role: fields[1].to_string(),
            setype: fields[2].to_string(),
            range: fields.get(3).copied().unwrap_or_default().to_string(),
        })
    }
}

/// A single MLS/MCS level: a sensitivity plus a category set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Level {
    pub sensitivity: String,
    pub categories: CategoryRange,
}

impl Level {
    pub fn new(sensitivity: impl Into<String>, categories: CategoryRange) -> Self {
        Self {
            sensitivity: sensitivity.into(),
            categories,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sensitivity)?;
        if !self.categories.is_empty() {
            write!(f, ":{}", self.categories)?;
        }
        Ok(())
    }
}

impl FromStr for Level {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = || LabelError::MalformedContext(s.to_string());

        let (sensitivity, cats) = match s.split_once(':') {
            Some((sens, cats)) => (sens, Some(cats)),
            None => (s, None),
        };

        let digits = sensitivity.strip_prefix('s').ok_or_else(malformed)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }

        let categories = match cats {
            Some(cats) => cats.parse().map_err(|_| malformed())?,
            None => CategoryRange::default(),
        };

        Ok(Self {
            sensitivity: sensitivity.to_string(),
            categories,
        })
    }
}

/// An MLS range: a low level, optionally followed by `-` and a high level
///
/// ```text
/// s0-s0:c0.c1023
/// └┬┘ └────┬────┘
/// low     high
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MlsRange {
    pub low: Level,
    pub high: Option<Level>,
}

impl fmt::Display for MlsRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.low)?;
        if let Some(high) = &self.high {
            write!(f, "-{}", high)?;
        }
        Ok(())
    }
}

impl FromStr for MlsRange {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = |_| LabelError::MalformedContext(s.to_string());

        let (low, high) = match s.split_once('-') {
            Some((low, high)) => (low, Some(high)),
            None => (s, None),
        };

        Ok(Self {
            low: low.parse().map_err(malformed)?,
            high: high.map(|h| h.parse::<Level>()).transpose().map_err(malformed)?,
        })
    }
}

/// A set of category indices
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CategoryRange(BTreeSet<u32>);

impl CategoryRange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, category: u32) -> bool {
        self.0.insert(category)
    }

    pub fn contains(&self, category: u32) -> bool {
        self.0.contains(&category)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }

    pub fn is_disjoint(&self, other: &CategoryRange) -> bool {
        self.0.is_disjoint(&other.0)
    }
}

impl FromIterator<u32> for CategoryRange {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn parse_category(token: &str) -> Option<u32> {
    let digits = token.strip_prefix('c')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().filter(|&c| c < MAX_CATEGORY)
}

impl FromStr for CategoryRange {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = || LabelError::MalformedContext(s.to_string());
        let mut set = BTreeSet::new();

        for item in s.split(',') {
            match item.split_once('.') {
                Some((lo, hi)) => {
                    let lo = parse_category(lo).ok_or_else(malformed)?;
                    let hi = parse_category(hi).ok_or_else(malformed)?;
                    if lo > hi {
                        return Err(malformed());
                    }
                    set.extend(lo..=hi);
                }
                None => {
                    set.insert(parse_category(item).ok_or_else(malformed)?);
                }
            }
        }

        Ok(Self(set))
    }
}

impl fmt::Display for CategoryRange {
    /// Runs of three or more become `cA.cB`, everything else is comma-joined.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        let mut iter = self.0.iter().copied().peekable();

        while let Some(start) = iter.next() {
            let mut end = start;
            while let Some(next) = end.checked_add(1).filter(|n| iter.peek() == Some(n)) {
                end = next;
                iter.next();
            }
            match end - start {
                0 => parts.push(format!("c{}", start)),
                1 => {
                    parts.push(format!("c{}", start));
                    parts.push(format!("c{}", end));
                }
                _ => parts.push(format!("c{}.c{}", start, end)),
            }
        }

        f.write_str(&parts.join(","))
    }
}
