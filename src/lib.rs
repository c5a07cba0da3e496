// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! receipt-renamer: AI-assisted renaming of receipt PDFs
//!
//! Files in a directory are analyzed concurrently for their payment date and
//! issuing service, results are cached by content hash, and each file is renamed
//! to `<YYYYMMDD>-<service pattern>-<original name>` without ever overwriting
//! an existing file.

pub mod ai;
pub mod cache;
pub mod config;
pub mod discovery;
pub mod error;
pub mod history;
pub mod item;
pub mod naming;
pub mod orchestrator;
pub mod renamer;
pub mod runner;

pub use config::AppConfig;
pub use error::{ReceiptError, Result};
