//! Sequence keys: filename ordering prefixes with one-second resolution

use crate::error::{ReconcileError, Result};
use chrono::{Duration, NaiveDateTime, Timelike};
use std::fmt;
use std::str::FromStr;

const CANONICAL_FORMAT: &str = "%Y_%m_%d_%H%M%S";
const LEGACY_FORMAT: &str = "%Y%m%d%H%M%S";

pub const CANONICAL_LEN: usize = 17;
pub const LEGACY_LEN: usize = 14;

/// Which textual encoding a key was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEncoding {
    /// `YYYY_MM_DD_HHMMSS`
    Canonical,
    /// `YYYYMMDDHHMMSS`
    Legacy,
}

/// An ordering key. Always displayed in canonical encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SequenceKey(NaiveDateTime);

impl SequenceKey {
    /// Truncate to the clock unit
    pub fn from_datetime(at: NaiveDateTime) -> Self {
        Self(at.with_nanosecond(0).unwrap_or(at))
    }

    pub fn datetime(&self) -> NaiveDateTime {
        self.0
    }

    /// The next key one clock unit later
    pub fn next(&self) -> Self {
        Self(self.0 + Duration::seconds(1))
    }

    pub fn parse_with_encoding(raw: &str) -> Result<(Self, KeyEncoding)> {
        let (format, encoding) = match raw.len() {
            CANONICAL_LEN => (CANONICAL_FORMAT, KeyEncoding::Canonical),
            LEGACY_LEN if raw.bytes().all(|b| b.is_ascii_digit()) => {
                (LEGACY_FORMAT, KeyEncoding::Legacy)
            }
            _ => return Err(ReconcileError::InvalidKey(raw.to_string())),
        };
        let at = NaiveDateTime::parse_from_str(raw, format)
            .map_err(|_| ReconcileError::InvalidKey(raw.to_string()))?;
        Ok((Self(at), encoding))
    }

    /// Split `<key>_<rest>` file names; returns `None` when the name does
    /// not start with a key in either encoding.
    pub fn split_file_name(file_name: &str) -> Option<(Self, KeyEncoding, &str)> {
        for len in [CANONICAL_LEN, LEGACY_LEN] {
            if file_name.len() <= len || !file_name.is_char_boundary(len) {
                continue;
            }
            let (prefix, rest) = file_name.split_at(len);
            let Some(rest) = rest.strip_prefix('_') else {
                continue;
            };
            if let Ok((key, encoding)) = Self::parse_with_encoding(prefix) {
                return Some((key, encoding, rest));
            }
        }
        None
    }

    pub fn legacy_string(&self) -> String {
        self.0.format(LEGACY_FORMAT).to_string()
    }
}

impl fmt::Display for SequenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(CANONICAL_FORMAT))
    }
}

impl FromStr for SequenceKey {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_with_encoding(s).map(|(key, _)| key)
    }
}
