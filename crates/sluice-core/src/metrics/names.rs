//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Metric and label names

pub const RECORDS_RECEIVED_TOTAL: &str = "records_received_total";
pub const RECEIVER_MALFORMED_TOTAL: &str = "receiver_malformed_total";
pub const RECEIVER_ERRORS_TOTAL: &str = "receiver_errors_total";
pub const STAGE_RECORDS_IN_TOTAL: &str = "stage_records_in_total";
pub const STAGE_RECORDS_OUT_TOTAL: &str = "stage_records_out_total";
pub const RECORDS_DROPPED_TOTAL: &str = "records_dropped_total";
pub const PIPELINE_QUEUE_DEPTH: &str = "pipeline_queue_depth";
pub const EXPORTER_QUEUE_DEPTH: &str = "exporter_queue_depth";
pub const EXPORTER_QUEUE_OVERFLOW_TOTAL: &str = "exporter_queue_overflow_total";
pub const EXPORTER_RETRIES_TOTAL: &str = "exporter_retries_total";
pub const EXPORTER_BATCHES_DELIVERED_TOTAL: &str = "exporter_batches_delivered_total";
pub const EXPORTER_RECORDS_DELIVERED_TOTAL: &str = "exporter_records_delivered_total";
pub const EXPORTER_BATCHES_DROPPED_TOTAL: &str = "exporter_batches_dropped_total";
pub const EXPORTER_RECORDS_REJECTED_TOTAL: &str = "exporter_records_rejected_total";
pub const RECORDS_LOST_TOTAL: &str = "records_lost_total";

pub mod labels {
    pub const RECEIVER: &str = "receiver";
    pub const PIPELINE: &str = "pipeline";
    pub const STAGE: &str = "stage";
    pub const EXPORTER: &str = "exporter";
    pub const REASON: &str = "reason";
}

pub mod reasons {
    pub const FILTERED: &str = "filtered";
    pub const SAMPLED: &str = "sampled";
    pub const PROCESSING_ERROR: &str = "processing_error";
    pub const BACKPRESSURE: &str = "backpressure";
    pub const UNROUTED: &str = "unrouted";
    pub const RETRY_EXHAUSTED: &str = "retry_exhausted";
    pub const PERMANENT: &str = "permanent";
    pub const QUEUE_OVERFLOW: &str = "queue_overflow";
    pub const SHUTDOWN: &str = "shutdown";
}
