//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! File sink writing one JSON record per line

use async_trait::async_trait;
use sluice_core::{Batch, PipelineError, PipelineResult};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

use super::{DeliveryReceipt, ExportSink};

/// Append-only JSON lines sink
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

/// Serialize every record of a batch as a JSON line
pub(crate) fn json_lines(batch: &Batch) -> PipelineResult<Vec<u8>> {
    let mut buffer = Vec::new();
    for record in &batch.records {
        serde_json::to_writer(&mut buffer, record.as_ref())?;
        buffer.push(b'\n');
    }
    Ok(buffer)
}

#[async_trait]
impl ExportSink for FileSink {
    async fn deliver(&self, batch: &Batch) -> PipelineResult<DeliveryReceipt> {
        let payload = json_lines(batch)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| {
                PipelineError::io_with_source(format!("failed to open {}", self.path.display()), e)
            })?;
        file.write_all(&payload).await?;
        file.flush().await?;

        Ok(DeliveryReceipt::full(batch))
    }
}
