use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Which component of a version an event advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Increment {
    Patch,
    Minor,
    Major,
}

impl Increment {
    /// Tie-break order when an event carries several configured labels.
    pub const PRIORITY: [Increment; 3] = [Increment::Major, Increment::Minor, Increment::Patch];

    pub fn as_str(&self) -> &'static str {
        match self {
            Increment::Major => "major",
            Increment::Minor => "minor",
            Increment::Patch => "patch",
        }
    }
}

impl fmt::Display for Increment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `major.minor.patch`, ordered lexicographically.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SemVer {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl SemVer {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Bumping never goes backwards: major resets minor and patch, minor
    /// resets patch.
    #[must_use]
    pub fn bump(self, increment: Increment) -> Self {
        match increment {
            Increment::Major => Self::new(self.major + 1, 0, 0),
            Increment::Minor => Self::new(self.major, self.minor + 1, 0),
            Increment::Patch => Self::new(self.major, self.minor, self.patch + 1),
        }
    }
}

impl FromStr for SemVer {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);

        let parts: Vec<&str> = trimmed.split('.').collect();
        if parts.len() != 3 {
            return Err(Error::InvalidVersion(s.to_string()));
        }

        let component = |part: &str| -> Result<u64> {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(Error::InvalidVersion(s.to_string()));
            }
            part.parse().map_err(|_| Error::InvalidVersion(s.to_string()))
        };

        Ok(Self::new(
            component(parts[0])?,
            component(parts[1])?,
            component(parts[2])?,
        ))
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl Serialize for SemVer {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SemVer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

pub fn compare_versions(a: &SemVer, b: &SemVer) -> Ordering {
    a.cmp(b)
}

/// True when `new_version` is the same as or ahead of `old_version`.
pub fn valid_version_bump(old_version: &str, new_version: &str) -> Result<bool> {
    let old: SemVer = old_version.parse()?;
    let new: SemVer = new_version.parse()?;
    Ok(compare_versions(&new, &old) != Ordering::Less)
}

pub fn versions_in_sync(old_version: &str, new_version: &str) -> Result<bool> {
    let old: SemVer = old_version.parse()?;
    let new: SemVer = new_version.parse()?;
    Ok(compare_versions(&old, &new) == Ordering::Equal)
}
