// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

#![no_main]

use libfuzzer_sys::fuzz_target;
use receipt_renamer::ai::parse_receipt_response;

fuzz_target!(|text: &str| {
    if let Ok(info) = parse_receipt_response(text) {
        assert_eq!(info.date.len(), 8);
        assert!(info.date.bytes().all(|b| b.is_ascii_digit()));
        assert!(!info.service.trim().is_empty());
    }
});
