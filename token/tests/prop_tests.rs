use proptest::prelude::*;

use rollcall_token::{Payload, PayloadError};
use rollcall_types::{IdentityId, Timestamp};

fn field() -> impl Strategy<Value = String> {
    // Anything printable except the reserved delimiter.
    "[^|\r\n]{0,24}"
}

proptest! {
    /// Any well-formed payload parses back to the fields it was built from.
    #[test]
    fn encoded_payload_parses_back(
        id in "[A-Za-z0-9]{1,12}",
        name in field(),
        group in field(),
        secs in 0u64..Timestamp::MAX_WIRE.as_secs(),
    ) {
        let payload = Payload {
            identity_id: IdentityId::new(id),
            display_name: name,
            group_label: group,
            issued_at: Timestamp::new(secs),
        };
        let text = payload.encode().unwrap();
        prop_assert_eq!(Payload::parse(&text).unwrap(), payload);
    }

    /// The parser never panics and never succeeds without both required keys.
    #[test]
    fn parse_requires_id_and_ts(raw in ".{0,80}") {
        match Payload::parse(&raw) {
            Ok(p) => {
                prop_assert!(raw.contains("ID:"));
                prop_assert!(raw.contains("TS:"));
                prop_assert!(!p.identity_id.as_str().is_empty());
            }
            Err(e) => {
                // Typed error, never a partial payload.
                let _: PayloadError = e;
            }
        }
    }
}
