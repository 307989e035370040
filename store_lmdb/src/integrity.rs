//! LMDB database integrity checks.
//!
//! Run on startup to detect corruption early, before the station begins
//! validating presentations.

use std::collections::HashMap;
use std::path::Path;

use rollcall_store::IdentityRecord;

use crate::environment::{LmdbEnvironment, DATABASES};
use crate::identity::token_digest;
use crate::LmdbError;

/// Summary of an integrity check run.
#[derive(Debug, Default)]
pub struct IntegrityReport {
    pub databases_checked: u32,
    pub total_entries: u64,
    pub errors: Vec<String>,
}

impl IntegrityReport {
    /// Returns `true` if no errors were detected.
    pub fn is_healthy(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Check LMDB database integrity on startup.
///
/// Counts entries in every database, decodes every identity record, and
/// cross-checks that each live token is indexed to its owner and that the
/// index holds nothing else. Problems are recorded in the report rather
/// than causing a hard error.
pub fn check_integrity(env: &LmdbEnvironment) -> Result<IntegrityReport, LmdbError> {
    let mut report = IntegrityReport::default();
    let rtxn = env.env().read_txn()?;

    for &db_name in DATABASES {
        match env
            .env()
            .open_database::<heed::types::Bytes, heed::types::Bytes>(&rtxn, Some(db_name))
        {
            Ok(Some(db)) => {
                report.databases_checked += 1;
                match db.len(&rtxn) {
                    Ok(count) => report.total_entries += count,
                    Err(e) => report
                        .errors
                        .push(format!("failed to read database '{}': {}", db_name, e)),
                }
            }
            Ok(None) => report
                .errors
                .push(format!("database '{}' is missing", db_name)),
            Err(e) => report
                .errors
                .push(format!("failed to open database '{}': {}", db_name, e)),
        }
    }

    let mut expected_index: HashMap<[u8; 32], Vec<u8>> = HashMap::new();
    for entry in env.identities_db.iter(&rtxn)? {
        let (key, bytes) = entry?;
        match bincode::deserialize::<IdentityRecord>(bytes) {
            Ok(record) => {
                if record.identity_id.as_bytes() != key {
                    report.errors.push(format!(
                        "record {} stored under key {}",
                        record.identity_id,
                        String::from_utf8_lossy(key)
                    ));
                }
                if record.current_token.is_some() != record.issued_at.is_some() {
                    report.errors.push(format!(
                        "record {} has token and issued_at out of step",
                        record.identity_id
                    ));
                }
                if let Some(token) = &record.current_token {
                    expected_index.insert(token_digest(token), key.to_vec());
                }
            }
            Err(e) => report.errors.push(format!(
                "undecodable identity record {}: {}",
                String::from_utf8_lossy(key),
                e
            )),
        }
    }

    let mut indexed = 0usize;
    for entry in env.tokens_db.iter(&rtxn)? {
        let (digest, owner) = entry?;
        indexed += 1;
        let matches = <[u8; 32]>::try_from(digest)
            .ok()
            .and_then(|d| expected_index.get(&d))
            .is_some_and(|expected| expected.as_slice() == owner);
        if !matches {
            report.errors.push(format!(
                "token index entry {} does not match a live token of {}",
                hex::encode(digest),
                String::from_utf8_lossy(owner)
            ));
        }
    }
    if indexed < expected_index.len() {
        report.errors.push(format!(
            "{} live tokens are missing from the token index",
            expected_index.len() - indexed
        ));
    }

    Ok(report)
}

/// Check if the LMDB data directory looks valid before opening.
///
/// Returns `Ok(())` for a fresh (nonexistent) directory. Returns an error
/// if the directory exists but `data.mdb` is missing, which suggests
/// misconfiguration.
pub fn check_data_dir(path: &Path) -> Result<(), String> {
    if !path.exists() {
        return Ok(());
    }
    let data_file = path.join("data.mdb");
    if !data_file.exists() {
        return Err(format!(
            "LMDB directory exists but data.mdb is missing at {}",
            path.display()
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_store::{EnrollmentRecord, IdentityStore};
    use rollcall_types::{IdentityId, Timestamp};

    #[test]
    fn check_data_dir_fresh_path() {
        let dir = tempfile::tempdir().expect("temp dir");
        assert!(check_data_dir(&dir.path().join("not-yet")).is_ok());
    }

    #[test]
    fn check_data_dir_without_data_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        assert!(check_data_dir(dir.path()).is_err());
    }

    #[test]
    fn rotated_store_is_healthy() {
        let dir = tempfile::tempdir().expect("temp dir");
        let env = LmdbEnvironment::open(dir.path(), 4, 16 * 1024 * 1024).unwrap();
        let store = env.identity_store();
        store
            .bulk_load(&[EnrollmentRecord {
                identity_id: IdentityId::new("S001"),
                display_name: "Jo".into(),
                group_label: "A".into(),
            }])
            .unwrap();
        store
            .compare_and_rotate(&IdentityId::new("S001"), None, b"tok", Timestamp::new(5), None)
            .unwrap();

        let report = check_integrity(&env).unwrap();
        assert!(report.is_healthy(), "{:?}", report.errors);
        assert_eq!(report.databases_checked, 3);
        // one identity, one token, one schema version
        assert_eq!(report.total_entries, 3);
    }

    #[test]
    fn orphaned_index_entry_is_reported() {
        let dir = tempfile::tempdir().expect("temp dir");
        let env = LmdbEnvironment::open(dir.path(), 4, 16 * 1024 * 1024).unwrap();
        let mut wtxn = env.env().write_txn().unwrap();
        env.tokens_db
            .put(&mut wtxn, &token_digest(b"ghost"), b"S404")
            .unwrap();
        wtxn.commit().unwrap();

        let report = check_integrity(&env).unwrap();
        assert!(!report.is_healthy());
    }
}
