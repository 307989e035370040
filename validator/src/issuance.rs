//! Eager initial issuance for freshly enrolled identities.

use rollcall_store::{IdentityStore, RotateOutcome, StoreError};
use rollcall_token::TokenMinter;
use rollcall_types::IdentityId;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IssuanceReport {
    pub issued: u64,
    /// Identities that received a token from someone else meanwhile.
    pub conflicts: u64,
    /// Identities whose fields could not be encoded, or whose rotation the
    /// store rejected.
    pub failed: Vec<(IdentityId, String)>,
}

/// Mint and store a first token for every identity that has none.
///
/// Initial issuance does not record a presentation. Per-identity problems are
/// collected in the report; only a failure to talk to the store aborts.
pub fn issue_missing_tokens(
    store: &dyn IdentityStore,
    minter: &TokenMinter,
) -> Result<IssuanceReport, StoreError> {
    let mut report = IssuanceReport::default();

    for record in store.iter_unissued()? {
        let id = &record.identity_id;
        let token = match minter.mint(id, &record.display_name, &record.group_label) {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(identity = %id, error = %e, "cannot mint initial token");
                report.failed.push((id.clone(), e.to_string()));
                continue;
            }
        };

        let rotated =
            store.compare_and_rotate(id, None, token.encoded.as_bytes(), token.issued_at(), None);
        match rotated {
            Ok(RotateOutcome::Rotated) => report.issued += 1,
            Ok(RotateOutcome::Conflict) => report.conflicts += 1,
            Err(e) if e.is_transient() => return Err(e),
            Err(e) => {
                tracing::warn!(identity = %id, error = %e, "initial token rejected");
                report.failed.push((id.clone(), e.to_string()));
            }
        }
    }

    tracing::info!(
        issued = report.issued,
        conflicts = report.conflicts,
        failed = report.failed.len(),
        "initial issuance complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_nullables::{NullClock, NullIdentityStore};
    use rollcall_store::EnrollmentRecord;
    use rollcall_types::Timestamp;
    use std::sync::Arc;

    fn enroll(id: &str, name: &str) -> EnrollmentRecord {
        EnrollmentRecord {
            identity_id: IdentityId::new(id),
            display_name: name.into(),
            group_label: "A".into(),
        }
    }

    #[test]
    fn issues_one_token_per_unissued_identity() {
        let store = NullIdentityStore::with_enrolled(&[enroll("S001", "Jo"), enroll("S002", "Al")]);
        let minter = TokenMinter::new(Arc::new(NullClock::new(1_000)));

        let report = issue_missing_tokens(&store, &minter).unwrap();
        assert_eq!(report.issued, 2);
        assert!(report.failed.is_empty());

        let record = store.get(&IdentityId::new("S001")).unwrap();
        assert_eq!(record.issued_at, Some(Timestamp::new(1_000)));
        assert_eq!(record.last_presented_at, None);
        assert!(record.current_token.is_some());
    }

    #[test]
    fn second_run_issues_nothing() {
        let store = NullIdentityStore::with_enrolled(&[enroll("S001", "Jo")]);
        let minter = TokenMinter::new(Arc::new(NullClock::new(1_000)));
        issue_missing_tokens(&store, &minter).unwrap();

        let report = issue_missing_tokens(&store, &minter).unwrap();
        assert_eq!(report, IssuanceReport::default());
    }

    #[test]
    fn unencodable_identity_is_reported_not_fatal() {
        let store =
            NullIdentityStore::with_enrolled(&[enroll("S001", "Jo|Z"), enroll("S002", "Al")]);
        let minter = TokenMinter::new(Arc::new(NullClock::new(1_000)));

        let report = issue_missing_tokens(&store, &minter).unwrap();
        assert_eq!(report.issued, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, IdentityId::new("S001"));
        assert!(store.get(&IdentityId::new("S001")).unwrap().current_token.is_none());
    }

    #[test]
    fn offline_store_aborts() {
        let store = NullIdentityStore::with_enrolled(&[enroll("S001", "Jo")]);
        store.set_unavailable(true);
        let minter = TokenMinter::new(Arc::new(NullClock::new(1_000)));
        assert!(matches!(
            issue_missing_tokens(&store, &minter),
            Err(StoreError::Unavailable(_))
        ));
    }
}
