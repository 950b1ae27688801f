#![no_main]
use libfuzzer_sys::fuzz_target;
use objrepo::query::filters::{and, elem_match, eq, gt, in_, lte, not, or, regex, text};
use objrepo::query::{compare_for_sort, compile, eval_filter};

fuzz_target!(|data: &[u8]| {
    if data.len() > 8192 {
        return;
    }
    let Ok(json) = serde_json::from_slice::<serde_json::Value>(data) else { return };
    let Ok(bson::Bson::Document(doc)) = bson::Bson::try_from(json) else { return };

    let filters = [
        eq("a", 1),
        gt("a.b", 2.5),
        lte("name", "m"),
        in_("tags", ["x", "y"]),
        regex("name", "^[a-z]+$"),
        text("note.text", "ß"),
        elem_match("items", and([eq("k", "v"), not(gt("n", 0))])),
        elem_match("grid", elem_match("$", or([eq("$", true), lte("$", -1)]))),
    ];
    for f in &filters {
        if let Ok(c) = compile(f) {
            let _ = eval_filter(&doc, &c);
        }
    }
    let vals: Vec<&bson::Bson> = doc.values().collect();
    for w in vals.windows(2) {
        let _ = compare_for_sort(Some(w[0]), Some(w[1]));
    }
});
