//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Credential resolution
//!
//! Exporter specs carry an opaque [`CredentialHandle`]; the secret value is
//! resolved once when the exporter is built and never logged.

use sluice_core::config::CredentialHandle;
use sluice_core::{PipelineError, PipelineResult};
use std::collections::HashMap;
use std::fmt;

/// Resolved secret value
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw value; only for handing to the destination
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(..)")
    }
}

/// Resolves credential handles to secrets
pub trait SecretResolver: Send + Sync {
    fn resolve(&self, handle: &CredentialHandle) -> PipelineResult<Secret>;
}

/// Resolves `env:NAME` handles from the process environment
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSecretResolver;

impl SecretResolver for EnvSecretResolver {
    fn resolve(&self, handle: &CredentialHandle) -> PipelineResult<Secret> {
        let name = handle.as_str().strip_prefix("env:").ok_or_else(|| {
            PipelineError::configuration(format!(
                "unsupported credential handle scheme: {}",
                handle.as_str().split(':').next().unwrap_or_default()
            ))
        })?;

        std::env::var(name).map(Secret).map_err(|_| {
            PipelineError::configuration(format!(
                "credential environment variable '{}' is not set",
                name
            ))
        })
    }
}

/// Fixed handle to secret table
#[derive(Debug, Default, Clone)]
pub struct StaticSecretResolver {
    secrets: HashMap<String, Secret>,
}

impl StaticSecretResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, handle: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(handle.into(), Secret::new(value));
        self
    }
}

impl SecretResolver for StaticSecretResolver {
    fn resolve(&self, handle: &CredentialHandle) -> PipelineResult<Secret> {
        self.secrets
            .get(handle.as_str())
            .cloned()
            .ok_or_else(|| PipelineError::configuration("unknown credential handle"))
    }
}
