//! Fuzz test for diskutil plist parsing

#![no_main]

use flashcheck_detect::parse::{parse_plist_array, parse_plist_dict};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    for key in ["WholeDisks", "AllDisks", ""] {
        for item in parse_plist_array(data, key) {
            let _ = item.len();
        }
    }

    let info = parse_plist_dict(data);
    if let Some(mount) = info.get("MountPoint") {
        let _ = flashcheck_detect::is_system_mount_point(mount);
    }
});
