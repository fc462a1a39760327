//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! HTTP sink
//!
//! POSTs each batch as a JSON document. Status classification:
//! 2xx delivered; 408, 429 and 5xx transient; any other status permanent.
//! A 2xx body may carry `{"rejected_records": n}` for a partial acceptance.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use sluice_core::{Batch, PipelineError, PipelineResult};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use super::{DeliveryReceipt, ExportSink, Secret};

#[derive(Debug, Default, Deserialize)]
struct PartialSuccess {
    #[serde(default)]
    rejected_records: usize,
}

/// HTTP sink
#[derive(Debug)]
pub struct HttpSink {
    client: reqwest::Client,
    endpoint: String,
    headers: BTreeMap<String, String>,
    credential: Option<Secret>,
}

impl HttpSink {
    pub fn new(
        endpoint: String,
        headers: BTreeMap<String, String>,
        credential: Option<Secret>,
        timeout: Duration,
    ) -> PipelineResult<Self> {
        reqwest::Url::parse(&endpoint).map_err(|e| {
            PipelineError::configuration(format!("invalid exporter endpoint '{}': {}", endpoint, e))
        })?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::internal_with_source("failed to create HTTP client", e))?;

        Ok(Self {
            client,
            endpoint,
            headers,
            credential,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Classify a non-success status
pub(crate) fn status_error(status: StatusCode) -> PipelineError {
    let message = format!("destination responded with status {}", status);
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        PipelineError::export_delivery(message)
    } else {
        PipelineError::export_permanent(message)
    }
}

#[async_trait]
impl ExportSink for HttpSink {
    async fn deliver(&self, batch: &Batch) -> PipelineResult<DeliveryReceipt> {
        let body = serde_json::to_vec(batch)?;

        let mut request = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }
        if let Some(secret) = &self.credential {
            request = request.bearer_auth(secret.expose());
        }

        let response = request.body(body).send().await.map_err(|e| {
            if e.is_timeout() {
                PipelineError::timeout_with_source("export request timed out", e)
            } else {
                PipelineError::export_delivery_with_source("export request failed", e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status));
        }

        // An unreadable body on a 2xx still counts as full acceptance
        let partial = response
            .bytes()
            .await
            .ok()
            .and_then(|bytes| serde_json::from_slice::<PartialSuccess>(&bytes).ok())
            .unwrap_or_default();
        if partial.rejected_records > 0 {
            debug!(
                batch = %batch.id,
                rejected = partial.rejected_records,
                "Destination partially accepted batch"
            );
        }
        Ok(DeliveryReceipt::partial(batch, partial.rejected_records))
    }
}
