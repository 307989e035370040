//! Presence tokens: the payload codec and the minter.
//!
//! A token is the text a QR renderer embeds, e.g.
//! `ID:S001|Name:Jo|Class:A|TS:2024-03-01 12:30:05`. The payload binds an
//! identity to the moment the token was issued; the validator compares that
//! moment against the identity's stored watermark.

pub mod error;
pub mod minter;
pub mod payload;

pub use error::{EncodingError, PayloadError};
pub use minter::{EncodedToken, IssuedToken, TokenMinter};
pub use payload::{Payload, DELIMITER};
