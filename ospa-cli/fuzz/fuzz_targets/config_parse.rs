#![no_main]

use libfuzzer_sys::fuzz_target;
use ospa_cli::config::AdkConfig;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // Parsing may fail but must never panic, and whatever parses must
        // survive validation without panicking either
        if let Ok(cfg) = toml::from_str::<AdkConfig>(s) {
            let _ = cfg.validate();
        }
    }
});
