//! Error type for parsing the fundamental types.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypesError {
    #[error("invalid identity id: {0:?}")]
    InvalidIdentityId(String),

    #[error("invalid timestamp {input:?}: expected YYYY-MM-DD HH:MM:SS")]
    InvalidTimestamp { input: String },

    #[error("timestamp {0}s is outside the four-digit-year wire range")]
    TimestampOutOfRange(u64),
}
