//! Outcome codes of a single presentation attempt.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification reported for every presentation attempt.
///
/// Everything except `TransientError` is a terminal classification of the
/// attempt. `TransientError` only marks that the store could not be reached
/// and the caller may resubmit a later frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Accepted,
    Duplicate,
    Stale,
    Malformed,
    UnknownIdentity,
    TransientError,
}

impl Outcome {
    pub const ALL: [Outcome; 6] = [
        Outcome::Accepted,
        Outcome::Duplicate,
        Outcome::Stale,
        Outcome::Malformed,
        Outcome::UnknownIdentity,
        Outcome::TransientError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Accepted => "ACCEPTED",
            Outcome::Duplicate => "DUPLICATE",
            Outcome::Stale => "STALE",
            Outcome::Malformed => "MALFORMED",
            Outcome::UnknownIdentity => "UNKNOWN_IDENTITY",
            Outcome::TransientError => "TRANSIENT_ERROR",
        }
    }

    /// Whether this is a defined terminal classification of the attempt.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Outcome::TransientError)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
