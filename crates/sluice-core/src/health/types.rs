//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Health check types and data structures for the Sluice pipeline engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum HealthStatus {
    /// Component is healthy
    Healthy,

    /// Component is running but not fully functional
    Degraded,

    /// Component is unhealthy
    Unhealthy,
}

/// Component category
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Receiver,
    Pipeline,
    Exporter,
}

/// Component health information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// Component id
    pub name: String,

    /// Component category
    pub kind: ComponentKind,

    /// Component status
    pub status: HealthStatus,

    /// Whether the component's task is still running
    pub running: bool,

    /// Human readable detail
    pub message: Option<String>,
}

impl ComponentHealth {
    /// Create a new component health
    pub fn new(name: impl Into<String>, kind: ComponentKind, status: HealthStatus) -> Self {
        Self {
            name: name.into(),
            kind,
            status,
            running: true,
            message: None,
        }
    }

    /// Mark the component's task as stopped
    pub fn stopped(mut self) -> Self {
        self.running = false;
        self
    }

    /// Attach a message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Engine health information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    /// Engine started and no component task has died
    pub live: bool,

    /// Every exporter is able to deliver
    pub ready: bool,

    /// Overall status
    pub status: HealthStatus,

    /// Per-component health
    pub components: Vec<ComponentHealth>,

    /// Report timestamp
    pub timestamp: DateTime<Utc>,
}

impl HealthReport {
    /// Build a report from component health
    ///
    /// `started` is false before the engine starts and after shutdown.
    pub fn from_components(started: bool, components: Vec<ComponentHealth>) -> Self {
        let live = started && components.iter().all(|c| c.running);
        let ready = live
            && components
                .iter()
                .filter(|c| c.kind == ComponentKind::Exporter)
                .all(|c| c.status == HealthStatus::Healthy);

        let status = if !live {
            HealthStatus::Unhealthy
        } else if !ready || components.iter().any(|c| c.status != HealthStatus::Healthy) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        Self {
            live,
            ready,
            status,
            components,
            timestamp: Utc::now(),
        }
    }
}
