#![no_main]

use libfuzzer_sys::fuzz_target;

use deje_core::document::{Document, DocumentFile};

fuzz_target!(|data: &[u8]| {
    let Ok(file) = DocumentFile::from_slice(data) else {
        return;
    };
    let _ = file.hash_mismatches();
    let mut doc = Document::from_file(file);
    let _ = doc.events().verify_chain();

    let hashes: Vec<String> = doc.events().iter().map(|e| e.hash().to_string()).collect();
    for hash in hashes.iter().take(16) {
        let _ = doc.goto(hash);
    }
});
