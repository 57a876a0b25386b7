use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

/// UID root used when the caller does not configure one.
pub const DEFAULT_UID_PREFIX: &str = "9999";

/// DICOM caps unique identifiers at 64 characters.
const MAX_UID_LENGTH: usize = 64;
const MAX_PREFIX_LENGTH: usize = 32;

/// Keeps the entropy component at 12 digits so a maximum-length prefix
/// still yields a UID within [`MAX_UID_LENGTH`].
const ENTROPY_MODULUS: u128 = 1_000_000_000_000;

/// Generate a fresh unique identifier under `prefix`.
///
/// A blank prefix falls back to [`DEFAULT_UID_PREFIX`]. The remaining
/// components are the Unix timestamp, its microsecond fraction, and a
/// truncated v4 UUID, so concurrent generators do not need coordination.
pub fn new_uid(prefix: &str) -> String {
    let prefix = prefix.trim().trim_end_matches('.');
    let prefix = if prefix.is_empty() {
        DEFAULT_UID_PREFIX
    } else {
        prefix
    };
    let now = Utc::now();
    let entropy = Uuid::new_v4().as_u128() % ENTROPY_MODULUS;
    let uid = format!(
        "{}.{}.{}.{}",
        prefix,
        now.timestamp(),
        now.timestamp_subsec_micros(),
        entropy
    );
    debug_assert!(uid.len() <= MAX_UID_LENGTH);
    uid
}

/// A validated DICOM UID root: starts with 1-9, contains only digits and
/// dots with no empty components, and stays within 32 characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UidPrefix(String);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error(
    "{0:?} is not a valid UID prefix: it must start with 1-9, \
     contain only digits and dots, and stay within 32 characters"
)]
pub struct UidPrefixError(String);

impl UidPrefix {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for UidPrefix {
    type Err = UidPrefixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let valid = !s.is_empty()
            && s.len() <= MAX_PREFIX_LENGTH
            && s.starts_with(|c: char| ('1'..='9').contains(&c))
            && s.split('.')
                .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()));
        if valid {
            Ok(UidPrefix(s.to_owned()))
        } else {
            Err(UidPrefixError(s.to_owned()))
        }
    }
}

impl fmt::Display for UidPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
