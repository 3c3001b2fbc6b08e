//! Fuzz target for release blob decoding.
//!
//! `decode` must never panic, whatever the store hands it. Inputs are also
//! wrapped in base64 so the gzip and JSON layers get exercised, not just the
//! outer alphabet check.

#![no_main]

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use libfuzzer_sys::fuzz_target;
use release_watch::codec::{decode, maybe_gunzip};

fuzz_target!(|data: &[u8]| {
    let _ = decode(data);

    let wrapped = STANDARD.encode(data);
    let _ = decode(wrapped.as_bytes());

    let _ = maybe_gunzip(data.to_vec());
});
