//! Identity storage trait.

use crate::StoreError;
use rollcall_types::{IdentityId, Timestamp};
use serde::{Deserialize, Serialize};

/// Per-subject record: who they are and which token is currently live.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub identity_id: IdentityId,
    pub display_name: String,
    pub group_label: String,
    /// The single live encoded token. `None` until first issuance.
    pub current_token: Option<Vec<u8>>,
    /// When `current_token` was issued. `None` until first issuance.
    pub issued_at: Option<Timestamp>,
    /// Last accepted presentation.
    pub last_presented_at: Option<Timestamp>,
}

impl IdentityRecord {
    /// A freshly enrolled record with no token yet.
    pub fn enrolled(record: &EnrollmentRecord) -> Self {
        Self {
            identity_id: record.identity_id.clone(),
            display_name: record.display_name.clone(),
            group_label: record.group_label.clone(),
            current_token: None,
            issued_at: None,
            last_presented_at: None,
        }
    }

    /// The validity watermark; a never-issued record sits at the epoch.
    pub fn watermark(&self) -> Timestamp {
        self.issued_at.unwrap_or(Timestamp::EPOCH)
    }
}

/// One row of the roster feed consumed at enrollment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    pub identity_id: IdentityId,
    pub display_name: String,
    pub group_label: String,
}

/// Result of [`IdentityStore::compare_and_rotate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RotateOutcome {
    /// The new token and timestamps are now current.
    Rotated,
    /// The record's `issued_at` no longer matched; nothing was written.
    Conflict,
}

/// Counts reported by [`IdentityStore::bulk_load`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BulkLoadReport {
    pub inserted: u64,
    pub skipped: u64,
}

/// Trait for identity storage operations.
///
/// Implementations must make `compare_and_rotate` atomic: a subsequent `get`
/// observes either the old token with the old timestamps or the new token
/// with all new timestamps, never a mix.
pub trait IdentityStore: Send + Sync {
    /// Fetch a record. Returns [`StoreError::NotFound`] when not enrolled.
    fn get(&self, identity_id: &IdentityId) -> Result<IdentityRecord, StoreError>;

    /// Replace the current token if the record's `issued_at` still equals
    /// `expected_issued_at` (`None` meaning "never issued").
    ///
    /// `presented_at` is `Some` when the rotation consumes a presentation and
    /// `None` for initial issuance, which leaves `last_presented_at` alone.
    ///
    /// Fails with [`StoreError::InvalidRotation`] when `new_issued_at` does
    /// not strictly advance past `expected_issued_at`, and with
    /// [`StoreError::Duplicate`] when `new_token` is live for another identity.
    fn compare_and_rotate(
        &self,
        identity_id: &IdentityId,
        expected_issued_at: Option<Timestamp>,
        new_token: &[u8],
        new_issued_at: Timestamp,
        presented_at: Option<Timestamp>,
    ) -> Result<RotateOutcome, StoreError>;

    /// Insert roster rows, skipping identities that already exist.
    fn bulk_load(&self, records: &[EnrollmentRecord]) -> Result<BulkLoadReport, StoreError>;

    /// Records that have never been issued a token.
    fn iter_unissued(&self) -> Result<Vec<IdentityRecord>, StoreError>;

    fn identity_count(&self) -> Result<u64, StoreError>;

    fn exists(&self, identity_id: &IdentityId) -> Result<bool, StoreError> {
        match self.get(identity_id) {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Checks shared by every backend before a rotation is applied.
///
/// Returns `Ok(None)` when the rotation may proceed and `Ok(Some(Conflict))`
/// when the watermark moved.
pub fn check_rotation(
    record: &IdentityRecord,
    expected_issued_at: Option<Timestamp>,
    new_issued_at: Timestamp,
) -> Result<Option<RotateOutcome>, StoreError> {
    if record.issued_at != expected_issued_at {
        return Ok(Some(RotateOutcome::Conflict));
    }
    if let Some(expected) = expected_issued_at {
        if new_issued_at <= expected {
            return Err(StoreError::InvalidRotation(format!(
                "{}: new issued_at {} does not advance past {}",
                record.identity_id, new_issued_at, expected
            )));
        }
    }
    Ok(None)
}

/// Apply a rotation to an in-memory copy of a record.
pub fn apply_rotation(
    record: &mut IdentityRecord,
    new_token: &[u8],
    new_issued_at: Timestamp,
    presented_at: Option<Timestamp>,
) {
    record.current_token = Some(new_token.to_vec());
    record.issued_at = Some(new_issued_at);
    if presented_at.is_some() {
        record.last_presented_at = presented_at;
    }
}
