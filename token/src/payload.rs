//! Tagged-field payload codec.
//!
//! Wire form: `key:value` segments joined by [`DELIMITER`]. A segment splits
//! at its first `:` so values may themselves contain colons (timestamps do).
//! `ID` and `TS` are required; `Name` and `Class` are optional; any other
//! key is ignored so newer minters can add fields.

use rollcall_types::{IdentityId, Timestamp};
use serde::{Deserialize, Serialize};

use crate::{EncodingError, PayloadError};

/// Reserved segment separator. Never permitted inside a field value.
pub const DELIMITER: char = '|';

pub const KEY_ID: &str = "ID";
pub const KEY_NAME: &str = "Name";
pub const KEY_GROUP: &str = "Class";
pub const KEY_ISSUED_AT: &str = "TS";

/// Decoded token payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub identity_id: IdentityId,
    pub display_name: String,
    pub group_label: String,
    pub issued_at: Timestamp,
}

fn check_value(field: &'static str, value: &str) -> Result<(), EncodingError> {
    match value
        .chars()
        .find(|c| *c == DELIMITER || *c == '\n' || *c == '\r')
    {
        Some(found) => Err(EncodingError::ReservedCharacter { field, found }),
        None => Ok(()),
    }
}

impl Payload {
    /// Serialize to the wire form, refusing values that would not parse back.
    pub fn encode(&self) -> Result<String, EncodingError> {
        if self.identity_id.as_str().is_empty() {
            return Err(EncodingError::EmptyIdentityId);
        }
        check_value(KEY_ID, self.identity_id.as_str())?;
        check_value(KEY_NAME, &self.display_name)?;
        check_value(KEY_GROUP, &self.group_label)?;
        let ts = self
            .issued_at
            .to_wire()
            .map_err(|e| EncodingError::TimestampOutOfRange(e.to_string()))?;

        Ok(format!(
            "{KEY_ID}:{}{DELIMITER}{KEY_NAME}:{}{DELIMITER}{KEY_GROUP}:{}{DELIMITER}{KEY_ISSUED_AT}:{}",
            self.identity_id, self.display_name, self.group_label, ts
        ))
    }

    /// Parse a decoded payload.
    ///
    /// Surrounding whitespace is trimmed; nothing inside is normalised.
    pub fn parse(raw: &str) -> Result<Self, PayloadError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(PayloadError::Empty);
        }

        let mut fields: Vec<(&str, &str)> = Vec::with_capacity(4);
        for (index, segment) in raw.split(DELIMITER).enumerate() {
            if segment.is_empty() {
                return Err(PayloadError::EmptySegment { index });
            }
            let (key, value) = segment
                .split_once(':')
                .ok_or(PayloadError::MissingSeparator { index })?;
            if key.is_empty() {
                return Err(PayloadError::EmptyKey { index });
            }
            if fields.iter().any(|(k, _)| *k == key) {
                return Err(PayloadError::DuplicateKey(key.to_string()));
            }
            fields.push((key, value));
        }

        let lookup = |key: &str| fields.iter().find(|(k, _)| *k == key).map(|(_, v)| *v);

        let id = lookup(KEY_ID).ok_or(PayloadError::MissingKey(KEY_ID))?;
        let identity_id =
            IdentityId::parse(id).map_err(|e| PayloadError::InvalidIdentity(e.to_string()))?;
        let ts = lookup(KEY_ISSUED_AT).ok_or(PayloadError::MissingKey(KEY_ISSUED_AT))?;
        let issued_at =
            Timestamp::parse_wire(ts).map_err(|e| PayloadError::InvalidTimestamp(e.to_string()))?;
        // Accepting a token rotates past its issuance time, which needs one
        // more representable second.
        if issued_at >= Timestamp::MAX_WIRE {
            return Err(PayloadError::InvalidTimestamp(format!(
                "{ts} leaves no room for a later rotation"
            )));
        }

        Ok(Self {
            identity_id,
            display_name: lookup(KEY_NAME).unwrap_or_default().to_string(),
            group_label: lookup(KEY_GROUP).unwrap_or_default().to_string(),
            issued_at,
        })
    }
}
