#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parsing and expansion must never panic, whatever the input
    if let Ok(tree) = sift::query::parse_query(data) {
        let _ = sift::query::expand_tree(&tree, true);
    }
    let _ = sift::query::mark_query(data, true, sift::query::regex_finder(data));
});
