use thiserror::Error;

/// Failures that prevent a presentation from being classified at all.
///
/// None of these is an outcome: the attempt was neither accepted nor
/// rejected, and the caller decides whether to resubmit a later frame.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The store was unreachable or did not answer within the timeout.
    #[error("identity store unavailable: {0}")]
    TransientStore(String),

    /// The stored identity fields cannot be encoded into a token.
    #[error("cannot mint token: {0}")]
    Encoding(#[from] rollcall_token::EncodingError),

    /// The store answered with a non-transient failure (corruption, a
    /// rejected rotation).
    #[error("store error: {0}")]
    Store(#[from] rollcall_store::StoreError),
}

impl ValidationError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ValidationError::TransientStore(_))
    }
}
