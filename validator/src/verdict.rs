//! Terminal classification of one presentation attempt.

use rollcall_store::IdentityRecord;
use rollcall_token::{IssuedToken, PayloadError};
use rollcall_types::{IdentityId, Outcome, Timestamp};

/// Why a presentation counted as a duplicate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DuplicateReason {
    /// The replay guard saw the same identity within the cooldown.
    Cooldown,
    /// Another attempt rotated the token first.
    LostRace,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// The token was consumed. `record` is the state committed by the
    /// rotation and `token` is the replacement to hand to the subject.
    Accepted {
        record: IdentityRecord,
        token: IssuedToken,
    },
    Duplicate {
        identity_id: IdentityId,
        reason: DuplicateReason,
    },
    /// The token was issued before the identity's current watermark.
    Stale {
        identity_id: IdentityId,
        presented: Timestamp,
        current: Timestamp,
    },
    Malformed(PayloadError),
    UnknownIdentity(IdentityId),
}

impl Verdict {
    pub fn outcome(&self) -> Outcome {
        match self {
            Verdict::Accepted { .. } => Outcome::Accepted,
            Verdict::Duplicate { .. } => Outcome::Duplicate,
            Verdict::Stale { .. } => Outcome::Stale,
            Verdict::Malformed(_) => Outcome::Malformed,
            Verdict::UnknownIdentity(_) => Outcome::UnknownIdentity,
        }
    }

    pub fn identity_id(&self) -> Option<&IdentityId> {
        match self {
            Verdict::Accepted { record, .. } => Some(&record.identity_id),
            Verdict::Duplicate { identity_id, .. }
            | Verdict::Stale { identity_id, .. }
            | Verdict::UnknownIdentity(identity_id) => Some(identity_id),
            Verdict::Malformed(_) => None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted { .. })
    }

    /// Short human-readable reason, used in audit events.
    pub fn detail(&self) -> Option<String> {
        match self {
            Verdict::Accepted { token, .. } => Some(format!("rotated to {}", token.issued_at())),
            Verdict::Duplicate { reason, .. } => Some(
                match reason {
                    DuplicateReason::Cooldown => "within cooldown",
                    DuplicateReason::LostRace => "token already rotated by a concurrent scan",
                }
                .to_string(),
            ),
            Verdict::Stale { presented, current, .. } => {
                Some(format!("issued {presented}, current {current}"))
            }
            Verdict::Malformed(e) => Some(e.to_string()),
            Verdict::UnknownIdentity(_) => None,
        }
    }
}
