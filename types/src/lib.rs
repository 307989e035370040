//! Fundamental types for the Rollcall presence station.
//!
//! This crate defines the types shared across every other crate in the workspace:
//! identity ids, timestamps with their textual wire form, the clock abstraction,
//! and presentation outcome codes.

pub mod clock;
pub mod error;
pub mod identity;
pub mod outcome;
pub mod time;

pub use clock::{Clock, SystemClock};
pub use error::TypesError;
pub use identity::IdentityId;
pub use outcome::Outcome;
pub use time::Timestamp;
