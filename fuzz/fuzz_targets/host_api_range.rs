#![no_main]

use capmarket_core::host_api::{HostApiRange, SemVer};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    // Parsing must never panic, and an accepted range must round-trip
    // through its display form to an equal range.
    if let Ok(range) = HostApiRange::parse(input) {
        let rendered = range.to_string();
        let reparsed = HostApiRange::parse(&rendered).expect("display form must reparse");
        assert_eq!(range, reparsed);

        // Matching must be total over a few probe versions.
        for version in [
            SemVer::new(0, 0, 0),
            SemVer::new(1, 2, 3),
            SemVer::new(u64::MAX, 0, 0),
        ] {
            let _ = range.matches(version);
        }
    }
});
