#![no_main]

use chrono::NaiveDate;
use larder_list::{decode_table, ChannelListConfig};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let config = ChannelListConfig::new("fuzz-channel", "fuzz");
    let now = NaiveDate::from_ymd_opt(2023, 12, 27)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .expect("fixed reference time");

    let entries = decode_table(&text, &config, now);
    for (index, entry) in entries.iter().enumerate() {
        assert_eq!(entry.position as usize, index + 1);
        assert!(entry.quantity >= 1);
        assert!(!entry.name.trim().is_empty());
    }
});
