//! Target keys and the wildcard naming convention.
//!
//! A key is either a concrete name (`snap_confirm`) or a family pattern
//! (`wallet_plugin_*`) matching every `wallet_plugin_<suffix>`. Keys ending
//! in a bare `_` or a bare `*` are rejected, so a concrete name can never be
//! confused with a family pattern.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const FAMILY_SUFFIX: &str = "_*";

/// A parsed specification target key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TargetKey {
    /// Matches exactly one target name.
    Concrete(String),
    /// Matches `<base>_<suffix>` for any non-empty suffix.
    Family { base: String },
}

impl TargetKey {
    /// Parse a key, enforcing the naming rules.
    pub fn parse(key: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidTargetKey {
            key: key.to_string(),
            reason: reason.to_string(),
        };

        if let Some(base) = key.strip_suffix(FAMILY_SUFFIX) {
            if base.is_empty() {
                return Err(invalid("wildcard family has an empty base"));
            }
            if base.ends_with('_') || base.contains('*') {
                return Err(invalid("wildcard base must be a plain name"));
            }
            return Ok(Self::Family {
                base: base.to_string(),
            });
        }

        if key.is_empty() {
            return Err(invalid("key is empty"));
        }
        if key.ends_with('*') {
            return Err(invalid("wildcard must use the '_*' suffix"));
        }
        if key.ends_with('_') {
            return Err(invalid("key ends with a bare '_'"));
        }
        if key.contains('*') {
            return Err(invalid("'*' is only allowed as a '_*' suffix"));
        }
        Ok(Self::Concrete(key.to_string()))
    }

    pub fn is_family(&self) -> bool {
        matches!(self, Self::Family { .. })
    }

    /// Whether this key governs the given concrete target name.
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Concrete(key) => key == name,
            Self::Family { base } => family_suffix(base, name).is_some(),
        }
    }

    /// Whether two keys could both govern some target name.
    pub(crate) fn overlaps(&self, other: &TargetKey) -> bool {
        match (self, other) {
            (Self::Concrete(a), Self::Concrete(b)) => a == b,
            (Self::Family { .. }, Self::Concrete(name)) => self.matches(name),
            (Self::Concrete(name), Self::Family { .. }) => other.matches(name),
            (Self::Family { base: a }, Self::Family { base: b }) => {
                a == b || family_suffix(a, b).is_some() || family_suffix(b, a).is_some()
            }
        }
    }
}

impl std::fmt::Display for TargetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Concrete(name) => f.write_str(name),
            Self::Family { base } => write!(f, "{base}{FAMILY_SUFFIX}"),
        }
    }
}

impl TryFrom<String> for TargetKey {
    type Error = Error;

    fn try_from(key: String) -> Result<Self> {
        Self::parse(&key)
    }
}

impl From<TargetKey> for String {
    fn from(key: TargetKey) -> Self {
        key.to_string()
    }
}

/// Check that a name used on a permission is concrete.
pub fn validate_target_name(name: &str) -> Result<()> {
    if name.is_empty() || name.ends_with('*') || name.ends_with('_') {
        return Err(Error::InvalidTargetName(name.to_string()));
    }
    Ok(())
}

fn family_suffix<'a>(base: &str, name: &'a str) -> Option<&'a str> {
    name.strip_prefix(base)?
        .strip_prefix('_')
        .filter(|suffix| !suffix.is_empty())
}
