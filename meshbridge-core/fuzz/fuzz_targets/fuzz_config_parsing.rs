#![no_main]

use libfuzzer_sys::fuzz_target;
use meshbridge_core::config::Config;

// Arbitrary TOML must either parse into a valid config or fail cleanly
fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(config) = Config::from_toml(text) {
            assert!(config.validate().is_ok());
            let _ = config.to_toml();
        }
    }
});
