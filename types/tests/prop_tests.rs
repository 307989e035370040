use proptest::prelude::*;

use rollcall_types::{IdentityId, Timestamp};

proptest! {
    /// Wire text preserves ordering: comparing strings equals comparing seconds.
    #[test]
    fn wire_text_sorts_like_seconds(
        a in 0u64..=Timestamp::MAX_WIRE.as_secs(),
        b in 0u64..=Timestamp::MAX_WIRE.as_secs(),
    ) {
        let wa = Timestamp::new(a).to_wire().unwrap();
        let wb = Timestamp::new(b).to_wire().unwrap();
        prop_assert_eq!(wa.cmp(&wb), a.cmp(&b));
    }

    /// Every representable timestamp parses back from its wire text.
    #[test]
    fn wire_text_parses_back(secs in 0u64..=Timestamp::MAX_WIRE.as_secs()) {
        let ts = Timestamp::new(secs);
        let text = ts.to_wire().unwrap();
        prop_assert_eq!(text.len(), 19);
        prop_assert_eq!(Timestamp::parse_wire(&text).unwrap(), ts);
    }

    /// The wire parser never panics on arbitrary input.
    #[test]
    fn parse_wire_never_panics(s in ".{0,40}") {
        let _ = Timestamp::parse_wire(&s);
    }

    /// Timestamp bincode roundtrip, as stored by the LMDB backend.
    #[test]
    fn timestamp_bincode_roundtrip(secs in any::<u64>()) {
        let ts = Timestamp::new(secs);
        let encoded = bincode::serialize(&ts).unwrap();
        let decoded: Timestamp = bincode::deserialize(&encoded).unwrap();
        prop_assert_eq!(decoded, ts);
    }

    /// Identity ids made of printable non-space characters always parse.
    #[test]
    fn identity_id_accepts_trimmed_ascii(s in "[A-Za-z0-9_-]{1,16}") {
        let parsed = IdentityId::parse(&s).unwrap();
        prop_assert_eq!(parsed.as_str(), s.as_str());
    }
}
