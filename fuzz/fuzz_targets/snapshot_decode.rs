#![no_main]

use libfuzzer_sys::fuzz_target;
use sso_ha_core::{JsonPrincipalCodec, PrincipalTypes, SsoEntrySnapshot};

// Arbitrary replication payloads must either be rejected or decode into a
// snapshot that re-encodes to an equal value.
fuzz_target!(|data: &[u8]| {
    let Ok(snapshot) = SsoEntrySnapshot::from_slice(data) else {
        return;
    };

    let _ = snapshot.decode_principal(&JsonPrincipalCodec, &PrincipalTypes::with_defaults());
    let _ = snapshot.idle_deadline_ms();
    let _ = snapshot.is_idle_expired(u64::MAX);

    let wire = snapshot.to_json().expect("decoded snapshot must re-encode");
    let again = SsoEntrySnapshot::from_json(&wire).expect("re-encoded snapshot must decode");
    assert_eq!(again, snapshot);
});
