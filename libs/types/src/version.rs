//! Product Version
//!
//! Three-component node software version with a total order, used to
//! index topology snapshots by the oldest version that can serve a
//! request.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid product version '{input}': {reason}")]
pub struct VersionParseError {
    pub input: String,
    pub reason: String,
}

/// Node software version, ordered `major`, then `minor`, then `patch`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ProductVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl ProductVersion {
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for ProductVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for ProductVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('.');
        let mut next = |what: &str| -> Result<u16, VersionParseError> {
            parts
                .next()
                .ok_or_else(|| VersionParseError {
                    input: s.to_string(),
                    reason: format!("missing {} component", what),
                })?
                .parse::<u16>()
                .map_err(|e| VersionParseError {
                    input: s.to_string(),
                    reason: format!("bad {} component: {}", what, e),
                })
        };

        let version = ProductVersion {
            major: next("major")?,
            minor: next("minor")?,
            patch: next("patch")?,
        };

        if parts.next().is_some() {
            return Err(VersionParseError {
                input: s.to_string(),
                reason: "trailing components".to_string(),
            });
        }

        Ok(version)
    }
}
