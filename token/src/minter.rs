//! Token minter.
//!
//! Captures the issuance time from a [`Clock`] and renders the payload. The
//! minter never touches the store; the caller persists the result through
//! compare-and-rotate.

use std::fmt;
use std::sync::Arc;

use rollcall_types::{Clock, IdentityId, SystemClock, Timestamp};

use crate::{EncodingError, Payload};

/// The bytes a QR renderer embeds.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct EncodedToken(Vec<u8>);

impl EncodedToken {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The payload text. Tokens are always minted from UTF-8 payloads.
    pub fn as_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl fmt::Debug for EncodedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncodedToken({:?})", self.as_text())
    }
}

/// A freshly minted token and the payload it encodes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedToken {
    pub payload: Payload,
    pub encoded: EncodedToken,
}

impl IssuedToken {
    pub fn issued_at(&self) -> Timestamp {
        self.payload.issued_at
    }
}

pub struct TokenMinter {
    clock: Arc<dyn Clock>,
}

impl TokenMinter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Minter reading the operating system clock.
    pub fn system() -> Self {
        Self::new(Arc::new(SystemClock))
    }

    /// Mint a token stamped with the current clock time.
    pub fn mint(
        &self,
        identity_id: &IdentityId,
        display_name: &str,
        group_label: &str,
    ) -> Result<IssuedToken, EncodingError> {
        self.mint_at(identity_id, display_name, group_label, self.clock.now())
    }

    /// Mint a token whose issuance time is strictly after `floor`.
    ///
    /// Uses the clock time when it is already past `floor`, otherwise
    /// `floor + 1s`. Rotations therefore always advance even when several
    /// happen within one clock second.
    pub fn mint_after(
        &self,
        identity_id: &IdentityId,
        display_name: &str,
        group_label: &str,
        floor: Timestamp,
    ) -> Result<IssuedToken, EncodingError> {
        let now = self.clock.now();
        let issued_at = now.max(floor.next_tick());
        if issued_at != now {
            tracing::debug!(
                identity = %identity_id,
                clock = %now,
                issued_at = %issued_at,
                "issuance time forced past previous rotation"
            );
        }
        self.mint_at(identity_id, display_name, group_label, issued_at)
    }

    fn mint_at(
        &self,
        identity_id: &IdentityId,
        display_name: &str,
        group_label: &str,
        issued_at: Timestamp,
    ) -> Result<IssuedToken, EncodingError> {
        let payload = Payload {
            identity_id: identity_id.clone(),
            display_name: display_name.to_string(),
            group_label: group_label.to_string(),
            issued_at,
        };
        let text = payload.encode()?;
        Ok(IssuedToken {
            payload,
            encoded: EncodedToken(text.into_bytes()),
        })
    }
}

impl Default for TokenMinter {
    fn default() -> Self {
        Self::system()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_nullables::NullClock;

    fn minter_at(secs: u64) -> (Arc<NullClock>, TokenMinter) {
        let clock = Arc::new(NullClock::new(secs));
        let minter = TokenMinter::new(clock.clone());
        (clock, minter)
    }

    #[test]
    fn mint_stamps_clock_time() {
        let (_clock, minter) = minter_at(1_709_296_205);
        let token = minter
            .mint(&IdentityId::new("S001"), "Jo", "A")
            .unwrap();
        assert_eq!(token.issued_at(), Timestamp::new(1_709_296_205));
        assert_eq!(
            token.encoded.as_text(),
            "ID:S001|Name:Jo|Class:A|TS:2024-03-01 12:30:05"
        );
    }

    #[test]
    fn encoded_token_decodes_to_same_payload() {
        let (_clock, minter) = minter_at(1_000_000);
        let token = minter.mint(&IdentityId::new("S001"), "Jo", "A").unwrap();
        let decoded = Payload::parse(&token.encoded.as_text()).unwrap();
        assert_eq!(decoded, token.payload);
    }

    #[test]
    fn mint_after_forces_advance_when_clock_has_not_ticked() {
        let (_clock, minter) = minter_at(500);
        let id = IdentityId::new("S001");
        let token = minter.mint_after(&id, "Jo", "A", Timestamp::new(500)).unwrap();
        assert_eq!(token.issued_at(), Timestamp::new(501));

        let token = minter.mint_after(&id, "Jo", "A", Timestamp::new(900)).unwrap();
        assert_eq!(token.issued_at(), Timestamp::new(901));
    }

    #[test]
    fn mint_after_uses_clock_when_already_later() {
        let (clock, minter) = minter_at(500);
        clock.advance(100);
        let token = minter
            .mint_after(&IdentityId::new("S001"), "Jo", "A", Timestamp::new(500))
            .unwrap();
        assert_eq!(token.issued_at(), Timestamp::new(600));
    }

    #[test]
    fn rotations_in_the_same_second_are_distinct() {
        let (_clock, minter) = minter_at(10_000);
        let id = IdentityId::new("S001");
        let first = minter.mint(&id, "Jo", "A").unwrap();
        let second = minter
            .mint_after(&id, "Jo", "A", first.issued_at())
            .unwrap();
        assert!(second.issued_at() > first.issued_at());
        assert_ne!(first.encoded, second.encoded);
    }

    #[test]
    fn reserved_delimiter_in_name_fails() {
        let (_clock, minter) = minter_at(1);
        let err = minter
            .mint(&IdentityId::new("S001"), "Jo|Class:Z", "A")
            .unwrap_err();
        assert!(matches!(err, EncodingError::ReservedCharacter { field: "Name", .. }));
    }

    #[test]
    fn clock_beyond_wire_range_fails() {
        let (_clock, minter) = minter_at(Timestamp::MAX_WIRE.as_secs() + 1);
        let err = minter.mint(&IdentityId::new("S001"), "Jo", "A").unwrap_err();
        assert!(matches!(err, EncodingError::TimestampOutOfRange(_)));
    }
}
