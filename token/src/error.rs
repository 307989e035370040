use thiserror::Error;

/// Why a payload could not be built from identity fields.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("identity id is empty")]
    EmptyIdentityId,

    #[error("field {field} contains reserved character {found:?}")]
    ReservedCharacter { field: &'static str, found: char },

    #[error("issuance time is outside the wire range: {0}")]
    TimestampOutOfRange(String),
}

/// Why a decoded payload was rejected as malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("payload is empty")]
    Empty,

    #[error("segment {index} is empty")]
    EmptySegment { index: usize },

    #[error("segment {index} has no key:value separator")]
    MissingSeparator { index: usize },

    #[error("segment {index} has an empty key")]
    EmptyKey { index: usize },

    #[error("key {0} appears more than once")]
    DuplicateKey(String),

    #[error("required key {0} is missing")]
    MissingKey(&'static str),

    #[error("invalid identity id: {0}")]
    InvalidIdentity(String),

    #[error("invalid issuance time: {0}")]
    InvalidTimestamp(String),
}
