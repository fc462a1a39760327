//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Stdout sink

use async_trait::async_trait;
use sluice_core::{Batch, PipelineResult};
use tokio::io::AsyncWriteExt;

use super::file_sink::json_lines;
use super::{DeliveryReceipt, ExportSink};

/// Writes JSON lines to standard output
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl StdoutSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExportSink for StdoutSink {
    async fn deliver(&self, batch: &Batch) -> PipelineResult<DeliveryReceipt> {
        let payload = json_lines(batch)?;
        let mut stdout = tokio::io::stdout();
        stdout.write_all(&payload).await?;
        stdout.flush().await?;
        Ok(DeliveryReceipt::full(batch))
    }
}
