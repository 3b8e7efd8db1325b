#![no_main]

use larder_list::{classify_line, LineCommand};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let line = text.trim();
    if line.is_empty() {
        return;
    }

    match classify_line(line) {
        LineCommand::Add { quantity, .. } => {
            assert!(quantity >= 1);
        }
        LineCommand::Remove(spec) => {
            // a removal that matches no position must still be well formed
            let _ = spec.is_clear_all();
            let _ = spec.matches(1);
        }
    }
});
