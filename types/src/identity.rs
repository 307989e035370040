//! Identity id of an enrolled subject.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::TypesError;

/// The immutable primary key of an enrolled subject (e.g. a student number).
///
/// Deserialization applies the same checks as [`IdentityId::parse`].
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct IdentityId(String);

impl IdentityId {
    /// Create an identity id from a trusted string.
    ///
    /// # Panics
    /// Panics if the string is empty or has surrounding whitespace.
    pub fn new(raw: impl Into<String>) -> Self {
        let s = raw.into();
        assert!(is_well_formed(&s), "identity id must be non-empty and trimmed");
        Self(s)
    }

    /// Validate an identity id coming from untrusted input.
    pub fn parse(raw: &str) -> Result<Self, TypesError> {
        Self::try_from(raw.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl TryFrom<String> for IdentityId {
    type Error = TypesError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        if is_well_formed(&raw) {
            Ok(Self(raw))
        } else {
            Err(TypesError::InvalidIdentityId(raw))
        }
    }
}

fn is_well_formed(s: &str) -> bool {
    !s.is_empty() && s.trim() == s
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for IdentityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
