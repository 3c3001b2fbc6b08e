//! Fuzz target for predecessor key arithmetic.
//!
//! Checks that `previous_key` never panics and, when it returns a key, that
//! key stays in the same namespace and is exactly one revision back.

#![no_main]

use libfuzzer_sys::fuzz_target;
use release_watch::resolver::{previous_key, revision_suffix};
use release_watch::store::RecordKey;

fuzz_target!(|data: (&str, &str)| {
    let (namespace, name) = data;
    let key = RecordKey::new(namespace, name);

    if let Some(prev) = previous_key(&key) {
        assert_eq!(prev.namespace, key.namespace);
        let current = revision_suffix(&key.name).expect("predecessor implies a revision");
        let previous = revision_suffix(&prev.name).expect("predecessor name has a revision");
        assert_eq!(previous + 1, current);
    }
});
