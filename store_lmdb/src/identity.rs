//! LMDB implementation of IdentityStore.
//!
//! `identities` maps the identity id bytes to a bincode `IdentityRecord`.
//! `tokens` maps the Blake2b-256 digest of each live token to the identity id
//! that owns it, which keeps live tokens unique across identities. A rotation
//! rewrites both in one write transaction.

use std::sync::Arc;

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use heed::types::Bytes;
use heed::{Database, Env, RoTxn};

use rollcall_store::identity::{apply_rotation, check_rotation};
use rollcall_store::{
    BulkLoadReport, EnrollmentRecord, IdentityRecord, IdentityStore, RotateOutcome, StoreError,
};
use rollcall_types::{IdentityId, Timestamp};

use crate::LmdbError;

type Blake2b256 = Blake2b<U32>;

pub struct LmdbIdentityStore {
    pub(crate) env: Arc<Env>,
    pub(crate) identities_db: Database<Bytes, Bytes>,
    pub(crate) tokens_db: Database<Bytes, Bytes>,
}

/// Index key of a live token.
pub fn token_digest(token: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(token);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

fn decode_record(bytes: &[u8]) -> Result<IdentityRecord, LmdbError> {
    Ok(bincode::deserialize(bytes)?)
}

impl LmdbIdentityStore {
    fn read_record(
        &self,
        txn: &RoTxn,
        identity_id: &IdentityId,
    ) -> Result<Option<IdentityRecord>, LmdbError> {
        match self.identities_db.get(txn, identity_id.as_bytes())? {
            Some(bytes) => Ok(Some(decode_record(bytes)?)),
            None => Ok(None),
        }
    }

    /// Identity currently owning `token`, if the token is live.
    pub fn token_owner(&self, token: &[u8]) -> Result<Option<IdentityId>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let owner = self
            .tokens_db
            .get(&rtxn, &token_digest(token))
            .map_err(LmdbError::from)?;
        match owner {
            Some(bytes) => {
                let raw = std::str::from_utf8(bytes)
                    .map_err(|e| StoreError::Corruption(format!("token index owner: {e}")))?;
                let id = IdentityId::parse(raw)
                    .map_err(|e| StoreError::Corruption(format!("token index owner: {e}")))?;
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }
}

impl IdentityStore for LmdbIdentityStore {
    fn get(&self, identity_id: &IdentityId) -> Result<IdentityRecord, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        self.read_record(&rtxn, identity_id)?
            .ok_or_else(|| StoreError::NotFound(identity_id.to_string()))
    }

    fn compare_and_rotate(
        &self,
        identity_id: &IdentityId,
        expected_issued_at: Option<Timestamp>,
        new_token: &[u8],
        new_issued_at: Timestamp,
        presented_at: Option<Timestamp>,
    ) -> Result<RotateOutcome, StoreError> {
        // LMDB allows one writer at a time, so the read-check-write below is
        // serialised against every other rotation.
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;

        let mut record = self
            .read_record(&wtxn, identity_id)?
            .ok_or_else(|| StoreError::NotFound(identity_id.to_string()))?;

        if let Some(outcome) = check_rotation(&record, expected_issued_at, new_issued_at)? {
            tracing::debug!(identity = %identity_id, "rotation conflict, aborting write");
            return Ok(outcome);
        }

        let new_digest = token_digest(new_token);
        if self
            .tokens_db
            .get(&wtxn, &new_digest)
            .map_err(LmdbError::from)?
            .is_some()
        {
            return Err(StoreError::Duplicate(format!(
                "token {} is already live",
                hex::encode(&new_digest[..8])
            )));
        }

        if let Some(old) = &record.current_token {
            self.tokens_db
                .delete(&mut wtxn, &token_digest(old))
                .map_err(LmdbError::from)?;
        }

        apply_rotation(&mut record, new_token, new_issued_at, presented_at);
        let bytes = bincode::serialize(&record).map_err(LmdbError::from)?;
        self.identities_db
            .put(&mut wtxn, identity_id.as_bytes(), &bytes)
            .map_err(LmdbError::from)?;
        self.tokens_db
            .put(&mut wtxn, &new_digest, identity_id.as_bytes())
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;

        tracing::debug!(
            identity = %identity_id,
            issued_at = %new_issued_at,
            token = %hex::encode(&new_digest[..8]),
            "token rotated"
        );
        Ok(RotateOutcome::Rotated)
    }

    fn bulk_load(&self, records: &[EnrollmentRecord]) -> Result<BulkLoadReport, StoreError> {
        let mut report = BulkLoadReport::default();
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        for record in records {
            let key = record.identity_id.as_bytes();
            let exists = self
                .identities_db
                .get(&wtxn, key)
                .map_err(LmdbError::from)?
                .is_some();
            if exists {
                report.skipped += 1;
                continue;
            }
            let bytes =
                bincode::serialize(&IdentityRecord::enrolled(record)).map_err(LmdbError::from)?;
            self.identities_db
                .put(&mut wtxn, key, &bytes)
                .map_err(LmdbError::from)?;
            report.inserted += 1;
        }
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(report)
    }

    fn iter_unissued(&self) -> Result<Vec<IdentityRecord>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let mut results = Vec::new();
        for entry in self.identities_db.iter(&rtxn).map_err(LmdbError::from)? {
            let (_key, bytes) = entry.map_err(LmdbError::from)?;
            let record = decode_record(bytes)?;
            if record.issued_at.is_none() {
                results.push(record);
            }
        }
        Ok(results)
    }

    fn identity_count(&self) -> Result<u64, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(self.identities_db.len(&rtxn).map_err(LmdbError::from)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LmdbEnvironment;

    fn temp_env() -> (tempfile::TempDir, LmdbEnvironment) {
        let dir = tempfile::tempdir().expect("temp dir");
        let env = LmdbEnvironment::open(dir.path(), 4, 16 * 1024 * 1024).expect("open env");
        (dir, env)
    }

    fn enrollment(id: &str) -> EnrollmentRecord {
        EnrollmentRecord {
            identity_id: IdentityId::new(id),
            display_name: format!("Name {id}"),
            group_label: "A".into(),
        }
    }

    #[test]
    fn bulk_load_is_idempotent() {
        let (_dir, env) = temp_env();
        let store = env.identity_store();

        let first = store
            .bulk_load(&[enrollment("S001"), enrollment("S002")])
            .unwrap();
        assert_eq!(first, BulkLoadReport { inserted: 2, skipped: 0 });

        let second = store
            .bulk_load(&[enrollment("S002"), enrollment("S003")])
            .unwrap();
        assert_eq!(second, BulkLoadReport { inserted: 1, skipped: 1 });
        assert_eq!(store.identity_count().unwrap(), 3);
    }

    #[test]
    fn bulk_load_does_not_overwrite_existing_record() {
        let (_dir, env) = temp_env();
        let store = env.identity_store();
        let id = IdentityId::new("S001");
        store.bulk_load(&[enrollment("S001")]).unwrap();
        store
            .compare_and_rotate(&id, None, b"tok-1", Timestamp::new(100), None)
            .unwrap();

        let mut renamed = enrollment("S001");
        renamed.display_name = "Someone Else".into();
        store.bulk_load(&[renamed]).unwrap();

        let record = store.get(&id).unwrap();
        assert_eq!(record.display_name, "Name S001");
        assert_eq!(record.current_token.as_deref(), Some(&b"tok-1"[..]));
    }

    #[test]
    fn get_missing_is_not_found() {
        let (_dir, env) = temp_env();
        let store = env.identity_store();
        let err = store.get(&IdentityId::new("S999")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn rotate_writes_token_and_timestamps_together() {
        let (_dir, env) = temp_env();
        let store = env.identity_store();
        let id = IdentityId::new("S001");
        store.bulk_load(&[enrollment("S001")]).unwrap();

        let outcome = store
            .compare_and_rotate(&id, None, b"tok-1", Timestamp::new(100), None)
            .unwrap();
        assert_eq!(outcome, RotateOutcome::Rotated);

        let outcome = store
            .compare_and_rotate(
                &id,
                Some(Timestamp::new(100)),
                b"tok-2",
                Timestamp::new(160),
                Some(Timestamp::new(150)),
            )
            .unwrap();
        assert_eq!(outcome, RotateOutcome::Rotated);

        let record = store.get(&id).unwrap();
        assert_eq!(record.current_token.as_deref(), Some(&b"tok-2"[..]));
        assert_eq!(record.issued_at, Some(Timestamp::new(160)));
        assert_eq!(record.last_presented_at, Some(Timestamp::new(150)));
    }

    #[test]
    fn stale_expectation_conflicts_without_writing() {
        let (_dir, env) = temp_env();
        let store = env.identity_store();
        let id = IdentityId::new("S001");
        store.bulk_load(&[enrollment("S001")]).unwrap();
        store
            .compare_and_rotate(&id, None, b"tok-1", Timestamp::new(100), None)
            .unwrap();

        // A second writer that still believes the record was never issued.
        let outcome = store
            .compare_and_rotate(&id, None, b"tok-x", Timestamp::new(200), Some(Timestamp::new(200)))
            .unwrap();
        assert_eq!(outcome, RotateOutcome::Conflict);

        let record = store.get(&id).unwrap();
        assert_eq!(record.current_token.as_deref(), Some(&b"tok-1"[..]));
        assert_eq!(record.issued_at, Some(Timestamp::new(100)));
        assert_eq!(record.last_presented_at, None);
        assert!(store.token_owner(b"tok-x").unwrap().is_none());
    }

    #[test]
    fn rotation_must_advance_issued_at() {
        let (_dir, env) = temp_env();
        let store = env.identity_store();
        let id = IdentityId::new("S001");
        store.bulk_load(&[enrollment("S001")]).unwrap();
        store
            .compare_and_rotate(&id, None, b"tok-1", Timestamp::new(100), None)
            .unwrap();

        let err = store
            .compare_and_rotate(&id, Some(Timestamp::new(100)), b"tok-2", Timestamp::new(100), None)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidRotation(_)));
    }

    #[test]
    fn live_token_cannot_be_bound_to_second_identity() {
        let (_dir, env) = temp_env();
        let store = env.identity_store();
        store
            .bulk_load(&[enrollment("S001"), enrollment("S002")])
            .unwrap();
        store
            .compare_and_rotate(&IdentityId::new("S001"), None, b"shared", Timestamp::new(1), None)
            .unwrap();

        let err = store
            .compare_and_rotate(&IdentityId::new("S002"), None, b"shared", Timestamp::new(1), None)
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
        assert!(store.get(&IdentityId::new("S002")).unwrap().current_token.is_none());
    }

    #[test]
    fn token_index_follows_rotation() {
        let (_dir, env) = temp_env();
        let store = env.identity_store();
        let id = IdentityId::new("S001");
        store.bulk_load(&[enrollment("S001")]).unwrap();
        store
            .compare_and_rotate(&id, None, b"tok-1", Timestamp::new(10), None)
            .unwrap();
        assert_eq!(store.token_owner(b"tok-1").unwrap(), Some(id.clone()));

        store
            .compare_and_rotate(&id, Some(Timestamp::new(10)), b"tok-2", Timestamp::new(11), None)
            .unwrap();
        assert_eq!(store.token_owner(b"tok-1").unwrap(), None);
        assert_eq!(store.token_owner(b"tok-2").unwrap(), Some(id));
    }

    #[test]
    fn iter_unissued_lists_only_tokenless_records() {
        let (_dir, env) = temp_env();
        let store = env.identity_store();
        store
            .bulk_load(&[enrollment("S001"), enrollment("S002")])
            .unwrap();
        store
            .compare_and_rotate(&IdentityId::new("S001"), None, b"tok", Timestamp::new(1), None)
            .unwrap();

        let pending = store.iter_unissued().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].identity_id.as_str(), "S002");
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempfile::tempdir().expect("temp dir");
        let id = IdentityId::new("S001");
        {
            let env = LmdbEnvironment::open(dir.path(), 4, 16 * 1024 * 1024).unwrap();
            let store = env.identity_store();
            store.bulk_load(&[enrollment("S001")]).unwrap();
            store
                .compare_and_rotate(&id, None, b"tok", Timestamp::new(42), None)
                .unwrap();
        }
        let env = LmdbEnvironment::open(dir.path(), 4, 16 * 1024 * 1024).unwrap();
        let record = env.identity_store().get(&id).unwrap();
        assert_eq!(record.issued_at, Some(Timestamp::new(42)));
    }

    #[test]
    fn token_digest_is_deterministic() {
        assert_eq!(token_digest(b"abc"), token_digest(b"abc"));
        assert_ne!(token_digest(b"abc"), token_digest(b"abd"));
    }
}
