//! Fuzz target: crash ring over the storage port
//!
//! Builds crash entries from arbitrary (frequently invalid UTF-8) fuzz
//! bytes and drives record / entries / clear sequences against the
//! in-memory storage backend.
//!
//! Invariants checked:
//! - Reason truncation never panics, whatever the character boundaries
//! - An encoded entry always fits its 128-byte slot
//! - The ring never yields more than its 4 slots
//! - `clear` always leaves an empty ring
//!
//! cargo fuzz run fuzz_crash_log

#![no_main]

use libfuzzer_sys::fuzz_target;
use meshnode::adapters::nvs::NvsAdapter;
use meshnode::diagnostics::{CrashEntry, CrashLog};

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    let Ok(mut store) = NvsAdapter::new() else {
        return;
    };
    let mut ring = CrashLog::new();
    ring.init(&store);

    let writes = usize::from(data[0] % 8) + 1;
    for i in 0..writes {
        let start = (i * 7) % data.len();
        let reason = String::from_utf8_lossy(&data[start..]);
        let entry = CrashEntry::new(i as u64 * 37, &reason);

        assert!(entry.reason.len() <= 96, "reason escaped its bound");
        let encoded = postcard::to_allocvec(&entry).expect("entry must encode");
        assert!(
            encoded.len() <= 128,
            "encoded entry overflows its slot: {} bytes",
            encoded.len()
        );

        ring.record(&mut store, &entry);
    }

    let entries = ring.entries(&store);
    assert!(entries.len() <= 4, "ring yielded {} entries", entries.len());
    assert_eq!(entries.len(), ring.count(&store));

    ring.clear(&mut store);
    assert!(ring.entries(&store).is_empty(), "clear left entries behind");
});
