#![no_main]
use libfuzzer_sys::fuzz_target;
use slotplan_libs::slot::SlotKey;

fuzz_target!(|data: &str| {
    if let Ok(key) = data.parse::<SlotKey>() {
        let rendered = key.to_string();

        assert_eq!(
            rendered.parse::<SlotKey>(),
            Ok(key),
            "Canonical form must re-parse to the same key"
        );

        let zone = "America/New_York".parse().unwrap();
        let local = key.to_local(zone);
        let back = SlotKey::from_local(local.local_date, local.local_time, zone);

        // Round-trip may only drift at DST-ambiguous instants, and then by
        // exactly the transition offset on the same calendar day
        if back != key {
            assert_eq!(back.to_local(zone).local_date, local.local_date);
        }
    }
});
