use rollcall_store::StoreError;
use rollcall_store_lmdb::LmdbError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("roster error: {0}")]
    Roster(String),

    #[error("data directory: {0}")]
    DataDir(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("LMDB error: {0}")]
    Lmdb(#[from] LmdbError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
