#![no_main]

use libfuzzer_sys::fuzz_target;
use sso_ha_core::{JsonPrincipalCodec, PrincipalCodec, PrincipalTypes};

// Raw principal bytes: decode errors are fine, panics are not. Anything that
// decodes must re-encode and decode to an equivalent principal.
fuzz_target!(|data: &[u8]| {
    let types = PrincipalTypes::with_defaults();
    let codec = JsonPrincipalCodec;

    let Ok(principal) = codec.decode(data, &types) else {
        return;
    };
    let bytes = codec
        .encode(principal.as_ref())
        .expect("decoded principal must re-encode");
    let again = codec.decode(&bytes, &types).expect("re-encoded principal must decode");
    assert!(again.equivalent(principal.as_ref()));
});
