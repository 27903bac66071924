//! Fuzz test for settings TOML parsing
//!
//! Arbitrary TOML must either fail to parse or produce settings that
//! serialize back and convert to a test configuration without panicking.

#![no_main]

use flashcheck_core::Settings;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    if let Ok(settings) = toml::from_str::<Settings>(data) {
        let _ = toml::to_string_pretty(&settings);

        if let Ok(config) = settings.to_test_config() {
            assert!(config.validate().is_ok());
            assert!(config.speed_block_size > 0);
            assert!(!config.patterns.is_empty());
        }
    }

    for section in ["speed", "integrity", "capacity", "behavior", "report"] {
        let wrapped = format!("[{}]\n{}", section, data);
        if let Ok(settings) = toml::from_str::<Settings>(&wrapped) {
            let _ = settings.to_test_config();
        }
    }
});
