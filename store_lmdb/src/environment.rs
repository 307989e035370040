//! LMDB environment setup.

use std::path::Path;
use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use crate::identity::LmdbIdentityStore;
use crate::LmdbError;

/// The schema version that the current code writes.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Default maximum map size (1 GiB); a roster of identities is tiny.
pub const DEFAULT_MAP_SIZE: usize = 1024 * 1024 * 1024;

/// Named databases opened in every environment.
pub(crate) const DATABASES: &[&str] = &["identities", "tokens", "meta"];

const SCHEMA_VERSION_KEY: &[u8] = b"schema_version";

/// Wraps the LMDB environment and all database handles.
pub struct LmdbEnvironment {
    env: Arc<Env>,
    pub(crate) identities_db: Database<Bytes, Bytes>,
    pub(crate) tokens_db: Database<Bytes, Bytes>,
    pub(crate) meta_db: Database<Bytes, Bytes>,
}

impl LmdbEnvironment {
    /// Open or create an LMDB environment at the given path.
    pub fn open(path: &Path, max_dbs: u32, map_size: usize) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path)?;

        // SAFETY: the environment is opened once per process and the data
        // file is not modified by anything other than this handle.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(max_dbs.max(DATABASES.len() as u32))
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let identities_db = env.create_database::<Bytes, Bytes>(&mut wtxn, Some("identities"))?;
        let tokens_db = env.create_database::<Bytes, Bytes>(&mut wtxn, Some("tokens"))?;
        let meta_db = env.create_database::<Bytes, Bytes>(&mut wtxn, Some("meta"))?;

        let stored = match meta_db.get(&wtxn, SCHEMA_VERSION_KEY)? {
            Some(bytes) if bytes.len() == 4 => {
                let mut arr = [0u8; 4];
                arr.copy_from_slice(bytes);
                u32::from_le_bytes(arr)
            }
            Some(_) => {
                return Err(LmdbError::Serialization(
                    "schema_version has unexpected byte length".to_string(),
                ))
            }
            None => 0,
        };
        if stored > CURRENT_SCHEMA_VERSION {
            return Err(LmdbError::SchemaTooNew {
                found: stored,
                supported: CURRENT_SCHEMA_VERSION,
            });
        }
        if stored < CURRENT_SCHEMA_VERSION {
            meta_db.put(
                &mut wtxn,
                SCHEMA_VERSION_KEY,
                &CURRENT_SCHEMA_VERSION.to_le_bytes(),
            )?;
            tracing::info!(from = stored, to = CURRENT_SCHEMA_VERSION, "schema version set");
        }
        wtxn.commit()?;

        tracing::debug!(path = %path.display(), map_size, "LMDB environment opened");

        Ok(Self {
            env: Arc::new(env),
            identities_db,
            tokens_db,
            meta_db,
        })
    }

    /// Open with the default database count and map size.
    pub fn open_default(path: &Path) -> Result<Self, LmdbError> {
        Self::with_map_size(path, DEFAULT_MAP_SIZE)
    }

    /// Open with the default database count and a custom map size in bytes.
    pub fn with_map_size(path: &Path, map_size: usize) -> Result<Self, LmdbError> {
        Self::open(path, DATABASES.len() as u32, map_size)
    }

    pub fn env(&self) -> &Arc<Env> {
        &self.env
    }

    /// Stored schema version.
    pub fn schema_version(&self) -> Result<u32, LmdbError> {
        let rtxn = self.env.read_txn()?;
        match self.meta_db.get(&rtxn, SCHEMA_VERSION_KEY)? {
            Some(bytes) if bytes.len() == 4 => {
                let mut arr = [0u8; 4];
                arr.copy_from_slice(bytes);
                Ok(u32::from_le_bytes(arr))
            }
            Some(_) => Err(LmdbError::Serialization(
                "schema_version has unexpected byte length".to_string(),
            )),
            None => Ok(0),
        }
    }

    /// Identity store sharing this environment.
    pub fn identity_store(&self) -> LmdbIdentityStore {
        LmdbIdentityStore {
            env: Arc::clone(&self.env),
            identities_db: self.identities_db,
            tokens_db: self.tokens_db,
        }
    }
}
