#![no_main]

use libfuzzer_sys::fuzz_target;
use rollcall_store::IdentityRecord;
use rollcall_types::Timestamp;

fuzz_target!(|data: &[u8]| {
    // Stored records are bincode; a corrupted value must fail cleanly.
    if let Ok(record) = bincode::deserialize::<IdentityRecord>(data) {
        let _ = record.watermark();
        if let Some(ts) = record.issued_at {
            let _ = ts.to_wire();
        }
    }

    if data.len() >= 8 {
        let mut secs = [0u8; 8];
        secs.copy_from_slice(&data[..8]);
        let _ = Timestamp::new(u64::from_le_bytes(secs)).to_wire();
    }
});
