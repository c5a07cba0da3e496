// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! First-page rendering for backends that only accept images

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

use crate::{ReceiptError, Result};

/// Renders the first page of a document to PNG bytes
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    /// Whether the rasterizer can run on this machine
    fn is_available(&self) -> bool;

    async fn first_page_png(&self, path: &Path) -> Result<Vec<u8>>;
}

/// Rasterizer using poppler's `pdftoppm`
pub struct PdftoppmRasterizer {
    program: String,
    dpi: u32,
    scratch_root: PathBuf,
}

impl PdftoppmRasterizer {
    pub fn new() -> Self {
        Self {
            program: "pdftoppm".to_string(),
            dpi: 150,
            scratch_root: std::env::temp_dir(),
        }
    }

    fn find_program(&self) -> Option<PathBuf> {
        let paths = std::env::var_os("PATH")?;
        std::env::split_paths(&paths)
            .map(|dir| dir.join(&self.program))
            .find(|candidate| candidate.is_file())
    }
}

impl Default for PdftoppmRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageRasterizer for PdftoppmRasterizer {
    fn is_available(&self) -> bool {
        self.find_program().is_some()
    }

    async fn first_page_png(&self, path: &Path) -> Result<Vec<u8>> {
        let program = self.find_program().ok_or_else(|| {
            ReceiptError::Provider(
                "pdftoppm not found: please install poppler".to_string(),
            )
        })?;

        // Removed when dropped, including when a cancelled analysis drops this future
        let scratch = tempfile::Builder::new()
            .prefix("receipt-renamer-")
            .tempdir_in(&self.scratch_root)?;
        let output_base = scratch.path().join("page");

        debug!("Rasterizing {:?} with {:?}", path, program);

        // kill_on_drop lets a cancelled analysis take the child process down with it
        let status = Command::new(&program)
            .arg("-png")
            .arg("-singlefile")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg(path)
            .arg(&output_base)
            .kill_on_drop(true)
            .status()
            .await?;
        if !status.success() {
            return Err(ReceiptError::Analysis(format!(
                "failed to convert PDF to image: pdftoppm exited with {}",
                status
            )));
        }

        let png = tokio::fs::read(output_base.with_extension("png")).await?;
        if let Err(e) = scratch.close() {
            debug!("Failed to remove scratch directory: {}", e);
        }
        Ok(png)
    }
}
