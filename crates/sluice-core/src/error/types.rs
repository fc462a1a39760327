//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Error types for the Sluice pipeline engine
//!
//! The variants follow the engine's error taxonomy: which component raises
//! them and how far they may propagate.

use std::error::Error as StdError;
use thiserror::Error;

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Main error type for the pipeline engine
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Engine configuration errors (fatal at load time)
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    /// Invalid stage parameters or unknown stage kind (fatal at load time)
    #[error("Stage configuration error in '{stage}': {message}")]
    StageConfig {
        stage: String,
        message: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    /// Receiver parse/read failure
    #[error("Source read error: {message}")]
    SourceRead {
        message: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    /// A stage could not process one record
    #[error("Record processing error: {message}")]
    RecordProcessing {
        message: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    /// Transient delivery failure at a destination
    #[error("Export delivery error: {message}")]
    ExportDelivery {
        message: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    /// Destination rejected the payload; never retried
    #[error("Export rejected permanently: {message}")]
    ExportPermanent {
        message: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    /// A bounded queue was at capacity
    #[error("Queue overflow: {message}")]
    QueueOverflow { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    /// Timeout errors
    #[error("Timeout error: {message}")]
    Timeout {
        message: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    /// Filesystem and socket errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    /// Internal errors
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },
}

impl PipelineError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        PipelineError::Configuration {
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error with source
    pub fn configuration_with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        PipelineError::Configuration {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a stage configuration error
    pub fn stage_config(stage: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::StageConfig {
            stage: stage.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a stage configuration error with source
    pub fn stage_config_with_source(
        stage: impl Into<String>,
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        PipelineError::StageConfig {
            stage: stage.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a source read error
    pub fn source_read(message: impl Into<String>) -> Self {
        PipelineError::SourceRead {
            message: message.into(),
            source: None,
        }
    }

    /// Create a source read error with source
    pub fn source_read_with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        PipelineError::SourceRead {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a record processing error
    pub fn record_processing(message: impl Into<String>) -> Self {
        PipelineError::RecordProcessing {
            message: message.into(),
            source: None,
        }
    }

    /// Create a record processing error with source
    pub fn record_processing_with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        PipelineError::RecordProcessing {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a transient export error
    pub fn export_delivery(message: impl Into<String>) -> Self {
        PipelineError::ExportDelivery {
            message: message.into(),
            source: None,
        }
    }

    /// Create a transient export error with source
    pub fn export_delivery_with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        PipelineError::ExportDelivery {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a permanent export error
    pub fn export_permanent(message: impl Into<String>) -> Self {
        PipelineError::ExportPermanent {
            message: message.into(),
            source: None,
        }
    }

    /// Create a permanent export error with source
    pub fn export_permanent_with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        PipelineError::ExportPermanent {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a queue overflow error
    pub fn queue_overflow(message: impl Into<String>) -> Self {
        PipelineError::QueueOverflow {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        PipelineError::Serialization {
            message: message.into(),
            source: None,
        }
    }

    /// Create a serialization error with source
    pub fn serialization_with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        PipelineError::Serialization {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        PipelineError::Timeout {
            message: message.into(),
            source: None,
        }
    }

    /// Create a timeout error with source
    pub fn timeout_with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        PipelineError::Timeout {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an IO error with source
    pub fn io_with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        PipelineError::Io {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        PipelineError::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Create an internal error with source
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        PipelineError::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Check if a failed delivery should be retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::ExportDelivery { .. }
                | PipelineError::Timeout { .. }
                | PipelineError::Io { .. }
        )
    }

    /// Check if the error is permanent for the payload that caused it
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            PipelineError::ExportPermanent { .. }
                | PipelineError::Serialization { .. }
                | PipelineError::Configuration { .. }
                | PipelineError::StageConfig { .. }
        )
    }

    /// Check if the error must stop the engine from starting
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::Configuration { .. } | PipelineError::StageConfig { .. }
        )
    }

    /// Get error context for logging
    pub fn context(&self) -> crate::error::ErrorContext {
        crate::error::ErrorContext {
            error_type: self.error_type(),
            retryable: self.is_retryable(),
            permanent: self.is_permanent(),
            fatal: self.is_fatal(),
        }
    }

    /// Get the error type as a string
    pub fn error_type(&self) -> &'static str {
        match self {
            PipelineError::Configuration { .. } => "Configuration",
            PipelineError::StageConfig { .. } => "StageConfig",
            PipelineError::SourceRead { .. } => "SourceRead",
            PipelineError::RecordProcessing { .. } => "RecordProcessing",
            PipelineError::ExportDelivery { .. } => "ExportDelivery",
            PipelineError::ExportPermanent { .. } => "ExportPermanent",
            PipelineError::QueueOverflow { .. } => "QueueOverflow",
            PipelineError::Serialization { .. } => "Serialization",
            PipelineError::Timeout { .. } => "Timeout",
            PipelineError::Io { .. } => "Io",
            PipelineError::Internal { .. } => "Internal",
        }
    }
}
