// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use receipt_renamer::ai::ReceiptInfo;
use receipt_renamer::naming::{sanitize_service, Namer};

#[derive(Arbitrary, Debug)]
struct Input<'a> {
    fragment: &'a str,
    service: &'a str,
    original_name: &'a str,
}

fuzz_target!(|input: Input| {
    let sanitized = sanitize_service(input.service);
    assert!(!sanitized.contains(['/', '\\', ':', '*', '?', '"', '<', '>', '|']));
    assert!(!sanitized.starts_with('-') && !sanitized.ends_with('-'));

    let Ok(namer) = Namer::new(input.fragment) else {
        return;
    };
    let info = ReceiptInfo {
        date: "20250115".to_string(),
        service: input.service.to_string(),
    };
    if let Ok(name) = namer.generate(input.original_name, &info) {
        assert!(!name.contains('/'));
    }
});
