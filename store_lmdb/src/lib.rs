//! LMDB storage backend for the Rollcall presence station.
//!
//! Implements the storage traits from `rollcall-store` using the `heed` LMDB
//! bindings. All databases live in a single environment so that a rotation
//! touching the identity record and the token index commits atomically.

pub mod environment;
pub mod error;
pub mod identity;
pub mod integrity;

pub use environment::LmdbEnvironment;
pub use error::LmdbError;
pub use identity::LmdbIdentityStore;
