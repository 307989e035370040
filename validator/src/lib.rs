//! Presentation validation for the Rollcall station.
//!
//! A decoded token payload goes through a short state machine:
//! 1. **Parse**: a payload that does not parse is `MALFORMED`.
//! 2. **Replay guard**: a second read of the same identity within the
//!    cooldown is `DUPLICATE`, without touching the store.
//! 3. **Lookup**: an identity missing from the store is `UNKNOWN_IDENTITY`.
//! 4. **Freshness**: a payload issued before the stored watermark is `STALE`.
//! 5. **Rotate**: otherwise the token is consumed; a new token is minted and
//!    committed with compare-and-rotate. Losing that race is `DUPLICATE`.
//!
//! Every attempt is published on the [`EventBus`] for loggers and notifiers.

pub mod error;
pub mod event;
pub mod issuance;
pub mod metrics;
pub mod replay_guard;
pub mod validator;
pub mod verdict;

pub use error::ValidationError;
pub use event::{EventBus, PresentationEvent};
pub use issuance::{issue_missing_tokens, IssuanceReport};
pub use metrics::ValidatorMetrics;
pub use replay_guard::{GuardConfig, GuardDecision, ReplayGuard};
pub use validator::{PresentationValidator, ValidatorConfig};
pub use verdict::{DuplicateReason, Verdict};
