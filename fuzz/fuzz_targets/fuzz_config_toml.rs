//! Fuzz target for TOML SDK configuration parsing.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tb_common::SdkConfig;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(config) = SdkConfig::from_toml_str(text) {
            // a config that parsed must also derive presets without panicking
            let _ = config.validate();
            let _ = config.preset_for("logs");
        }
    }
});
