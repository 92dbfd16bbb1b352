//! Fuzz target for the bundle text parser.
//!
//! Parsing arbitrary text must return a bundle or a `MalformedBundleError`,
//! never panic. Accepted bundles are fed back through the writer as well.

#![no_main]

use hydra_bundle::{parse_bundle, parse_bundle_bytes, serialize};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(bundle) = parse_bundle_bytes(data) {
        let _ = parse_bundle(&serialize(&bundle));
    }
});
