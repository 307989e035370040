//! Abstract storage traits for the Rollcall presence station.
//!
//! Every storage backend (LMDB, in-memory for testing) implements these
//! traits. The validator and the daemon depend only on the traits.

pub mod error;
pub mod identity;

pub use error::StoreError;
pub use identity::{BulkLoadReport, EnrollmentRecord, IdentityRecord, IdentityStore, RotateOutcome};
