// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for receipt-renamer

use std::path::PathBuf;
use thiserror::Error;

use crate::item::ItemStatus;

/// Result type alias for receipt-renamer operations
pub type Result<T> = std::result::Result<T, ReceiptError>;

/// receipt-renamer error types
#[derive(Error, Debug)]
pub enum ReceiptError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("API error: {0}")]
    Api(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("AI provider unavailable: {0}")]
    Provider(String),

    #[error("Analysis error: {0}")]
    Analysis(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Destination file already exists: {}", .0.display())]
    Collision(PathBuf),

    #[error("Invalid status transition: {from:?} -> {to:?}")]
    InvalidTransition { from: ItemStatus, to: ItemStatus },

    #[error("Operation cancelled")]
    Cancelled,
}

impl From<minijinja::Error> for ReceiptError {
    fn from(e: minijinja::Error) -> Self {
        ReceiptError::Template(e.to_string())
    }
}
