//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Error context for structured logging of pipeline errors.

use std::fmt;

/// Error context for logging and monitoring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    pub error_type: &'static str,
    pub retryable: bool,
    pub permanent: bool,
    pub fatal: bool,
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ErrorContext {{ type: {}, retryable: {}, permanent: {}, fatal: {} }}",
            self.error_type, self.retryable, self.permanent, self.fatal
        )
    }
}
