#![no_main]

use capmarket_core::lockfile::DeploymentLockfile;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    // Decoding hostile lockfile text must never panic; an accepted
    // lockfile must survive a re-encode/decode cycle unchanged.
    if let Ok(lockfile) = DeploymentLockfile::from_json_str(input) {
        let rendered = lockfile.to_json_string();
        let reparsed = DeploymentLockfile::from_json_str(&rendered).expect("re-encode must parse");
        assert_eq!(lockfile, reparsed);
    }
});
