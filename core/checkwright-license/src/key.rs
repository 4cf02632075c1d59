//! License key normalization and format checking.
//!
//! Keys are 16 characters from `A-Z0-9`, displayed and stored in the
//! canonical grouped form `XXXX-XXXX-XXXX-XXXX`. Users type them with any
//! casing, spacing or hyphenation, so every comparison, storage write and
//! outbound request goes through [`normalize_key`] first.

use crate::error::{LicenseError, LicenseResult};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of significant characters in a key.
pub const KEY_LENGTH: usize = 16;

/// Characters per hyphen-separated group.
pub const KEY_GROUP_SIZE: usize = 4;

/// Strips everything but ASCII letters and digits, uppercases, and regroups
/// into `XXXX-XXXX-XXXX-XXXX` when exactly 16 characters remain.
///
/// Input that does not reduce to 16 characters is returned stripped and
/// uppercased but ungrouped, so it still fails [`is_valid_key_format`].
#[must_use]
pub fn normalize_key(raw: &str) -> String {
    let significant: Vec<char> = raw
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if significant.len() != KEY_LENGTH {
        return significant.into_iter().collect();
    }

    significant
        .chunks(KEY_GROUP_SIZE)
        .map(|group| group.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join("-")
}

/// Returns true if `key` is already in canonical grouped form.
#[must_use]
pub fn is_valid_key_format(key: &str) -> bool {
    let groups: Vec<&str> = key.split('-').collect();
    groups.len() == KEY_LENGTH / KEY_GROUP_SIZE
        && groups.iter().all(|g| {
            g.len() == KEY_GROUP_SIZE
                && g.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        })
}

/// A normalized, format-checked license key.
#[derive(Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct LicenseKey(String);

impl LicenseKey {
    /// Normalizes and validates a user-supplied key.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::InvalidKeyFormat`] if the key does not contain
    /// exactly 16 alphanumeric characters.
    pub fn parse(raw: &str) -> LicenseResult<Self> {
        let normalized = normalize_key(raw);
        if !is_valid_key_format(&normalized) {
            return Err(LicenseError::InvalidKeyFormat(format!(
                "expected {KEY_LENGTH} characters from A-Z and 0-9, got {}",
                normalized.len()
            )));
        }
        Ok(Self(normalized))
    }

    /// Returns the canonical key string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the key with the middle groups hidden, for logs.
    #[must_use]
    pub fn masked(&self) -> String {
        let groups: Vec<&str> = self.0.split('-').collect();
        match (groups.first(), groups.last()) {
            (Some(first), Some(last)) => format!("{first}-****-****-{last}"),
            _ => "****".to_string(),
        }
    }
}

impl fmt::Display for LicenseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for LicenseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LicenseKey").field(&self.masked()).finish()
    }
}

impl FromStr for LicenseKey {
    type Err = LicenseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// Persisted keys must already be canonical. User input goes through `parse`.
impl<'de> Deserialize<'de> for LicenseKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if !is_valid_key_format(&raw) {
            return Err(serde::de::Error::custom("license key is not in canonical form"));
        }
        Ok(Self(raw))
    }
}
