//! Fuzz target for JSON SDK configuration parsing.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tb_common::SdkConfig;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = SdkConfig::from_json_str(text);
    }
});
