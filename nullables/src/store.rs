//! Nullable store: thread-safe in-memory identity storage for testing.

use rollcall_store::identity::{apply_rotation, check_rotation};
use rollcall_store::{
    BulkLoadReport, EnrollmentRecord, IdentityRecord, IdentityStore, RotateOutcome, StoreError,
};
use rollcall_types::{IdentityId, Timestamp};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct State {
    records: HashMap<IdentityId, IdentityRecord>,
    /// Live token -> owner.
    tokens: HashMap<Vec<u8>, IdentityId>,
}

/// An in-memory identity store for testing.
///
/// Thread-safe for use with tokio's multi-threaded runtime. Every operation
/// holds one lock for its whole duration, which makes `compare_and_rotate`
/// atomic. The store can be taken offline or slowed down to exercise the
/// validator's transient-error path.
pub struct NullIdentityStore {
    state: Mutex<State>,
    unavailable: AtomicBool,
    latency_ms: AtomicU64,
    rotations: AtomicU64,
}

impl NullIdentityStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            unavailable: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
            rotations: AtomicU64::new(0),
        }
    }

    /// A store pre-populated with enrolled identities.
    pub fn with_enrolled(records: &[EnrollmentRecord]) -> Self {
        let store = Self::new();
        {
            let mut state = store.state.lock().unwrap();
            for r in records {
                state
                    .records
                    .insert(r.identity_id.clone(), IdentityRecord::enrolled(r));
            }
        }
        store
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every subsequent call by `latency` before it runs.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of successful rotations since creation.
    pub fn rotation_count(&self) -> u64 {
        self.rotations.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<(), StoreError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            std::thread::sleep(Duration::from_millis(latency));
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("null store is offline".into()));
        }
        Ok(())
    }
}

impl Default for NullIdentityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityStore for NullIdentityStore {
    fn get(&self, identity_id: &IdentityId) -> Result<IdentityRecord, StoreError> {
        self.enter()?;
        self.state
            .lock()
            .unwrap()
            .records
            .get(identity_id)
            .cloned()
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
        self.enter()?;
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let record = state
            .records
            .get_mut(identity_id)
            .ok_or_else(|| StoreError::NotFound(identity_id.to_string()))?;

        if let Some(outcome) = check_rotation(record, expected_issued_at, new_issued_at)? {
            return Ok(outcome);
        }
        if state.tokens.contains_key(new_token) {
            return Err(StoreError::Duplicate(format!(
                "token for {identity_id} is already live"
            )));
        }
        if let Some(old) = &record.current_token {
            state.tokens.remove(old);
        }
        apply_rotation(record, new_token, new_issued_at, presented_at);
        state
            .tokens
            .insert(new_token.to_vec(), identity_id.clone());
        self.rotations.fetch_add(1, Ordering::SeqCst);
        Ok(RotateOutcome::Rotated)
    }

    fn bulk_load(&self, records: &[EnrollmentRecord]) -> Result<BulkLoadReport, StoreError> {
        self.enter()?;
        let mut state = self.state.lock().unwrap();
        let mut report = BulkLoadReport::default();
        for r in records {
            if state.records.contains_key(&r.identity_id) {
                report.skipped += 1;
            } else {
                state
                    .records
                    .insert(r.identity_id.clone(), IdentityRecord::enrolled(r));
                report.inserted += 1;
            }
        }
        Ok(report)
    }

    fn iter_unissued(&self) -> Result<Vec<IdentityRecord>, StoreError> {
        self.enter()?;
        let state = self.state.lock().unwrap();
        let mut unissued: Vec<_> = state
            .records
            .values()
            .filter(|r| r.issued_at.is_none())
            .cloned()
            .collect();
        unissued.sort_by(|a, b| a.identity_id.cmp(&b.identity_id));
        Ok(unissued)
    }

    fn identity_count(&self) -> Result<u64, StoreError> {
        self.enter()?;
        Ok(self.state.lock().unwrap().records.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enrollment(id: &str) -> EnrollmentRecord {
        EnrollmentRecord {
            identity_id: IdentityId::new(id),
            display_name: "Jo".into(),
            group_label: "A".into(),
        }
    }

    #[test]
    fn rotate_then_get() {
        let store = NullIdentityStore::with_enrolled(&[enrollment("S001")]);
        let id = IdentityId::new("S001");
        let outcome = store
            .compare_and_rotate(&id, None, b"t1", Timestamp::new(10), Some(Timestamp::new(9)))
            .unwrap();
        assert_eq!(outcome, RotateOutcome::Rotated);
        let record = store.get(&id).unwrap();
        assert_eq!(record.issued_at, Some(Timestamp::new(10)));
        assert_eq!(record.last_presented_at, Some(Timestamp::new(9)));
        assert_eq!(store.rotation_count(), 1);
    }

    #[test]
    fn conflict_is_not_counted() {
        let store = NullIdentityStore::with_enrolled(&[enrollment("S001")]);
        let id = IdentityId::new("S001");
        store
            .compare_and_rotate(&id, None, b"t1", Timestamp::new(10), None)
            .unwrap();
        let outcome = store
            .compare_and_rotate(&id, None, b"t2", Timestamp::new(11), None)
            .unwrap();
        assert_eq!(outcome, RotateOutcome::Conflict);
        assert_eq!(store.rotation_count(), 1);
    }

    #[test]
    fn live_token_is_unique() {
        let store = NullIdentityStore::with_enrolled(&[enrollment("S001"), enrollment("S002")]);
        store
            .compare_and_rotate(&IdentityId::new("S001"), None, b"t", Timestamp::new(1), None)
            .unwrap();
        let err = store
            .compare_and_rotate(&IdentityId::new("S002"), None, b"t", Timestamp::new(1), None)
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[test]
    fn offline_store_reports_unavailable() {
        let store = NullIdentityStore::with_enrolled(&[enrollment("S001")]);
        store.set_unavailable(true);
        let err = store.get(&IdentityId::new("S001")).unwrap_err();
        assert!(err.is_transient());
        store.set_unavailable(false);
        assert!(store.get(&IdentityId::new("S001")).is_ok());
    }

    #[test]
    fn bulk_load_skips_existing() {
        let store = NullIdentityStore::with_enrolled(&[enrollment("S001")]);
        let report = store
            .bulk_load(&[enrollment("S001"), enrollment("S002")])
            .unwrap();
        assert_eq!(report, BulkLoadReport { inserted: 1, skipped: 1 });
        assert_eq!(store.identity_count().unwrap(), 2);
        assert_eq!(store.iter_unissued().unwrap().len(), 2);
    }
}
