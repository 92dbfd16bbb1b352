//! Fuzz target for hydra.json parsing and validation.
//!
//! Deserialization and semantic validation must reject bad input with an
//! error, never a panic.

#![no_main]

use hydra_config::{validate_config, HydraConfig};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(config) = serde_json::from_slice::<HydraConfig>(data) {
        if let Ok(table) = validate_config(&config) {
            assert!(table.validate().is_ok());
        }
    }
});
