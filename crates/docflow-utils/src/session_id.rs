//! Session identifier validation.
//!
//! Session ids are minted by the questionnaire platform and used verbatim as
//! directory names by the filesystem progress store, so they are validated on
//! entry and rejected when unsafe. There is no sanitization path: an id that
//! fails validation cannot correspond to any stored record.

use serde::{Deserialize, Serialize};

/// Maximum accepted session id length in bytes.
const MAX_LEN: usize = 128;

/// Validation failures for raw session ids.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionIdError {
    #[error("session id is empty")]
    Empty,

    #[error("session id is {len} bytes, maximum is {MAX_LEN}")]
    TooLong { len: usize },

    #[error("session id contains invalid character {ch:?}")]
    InvalidCharacter { ch: char },

    #[error("session id contains a '..' sequence")]
    PathTraversal,

    #[error("session id contains no alphanumeric characters")]
    NoAlphanumeric,
}

/// A validated, filesystem-safe session identifier.
///
/// Accepts ASCII alphanumerics plus `.`, `_` and `-`, with no `..`
/// sequences. Deserialization runs the same validation, so a `SessionId`
/// obtained from any source is safe to join into a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Validate a raw id.
    pub fn parse(raw: &str) -> Result<Self, SessionIdError> {
        if raw.is_empty() {
            return Err(SessionIdError::Empty);
        }
        if raw.len() > MAX_LEN {
            return Err(SessionIdError::TooLong { len: raw.len() });
        }
        for ch in raw.chars() {
            if !(ch.is_ascii_alphanumeric() || ch == '.' || ch == '_' || ch == '-') {
                return Err(SessionIdError::InvalidCharacter { ch });
            }
        }
        if raw.contains("..") {
            return Err(SessionIdError::PathTraversal);
        }
        if !raw.chars().any(|c| c.is_ascii_alphanumeric()) {
            return Err(SessionIdError::NoAlphanumeric);
        }
        Ok(Self(raw.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SessionId {
    type Error = SessionIdError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
