//! Alert events and the dispatchers that hand them to delivery channels.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::check::CheckResult;
use crate::target::Target;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Failure,
    Recovery,
}

impl AlertKind {
    pub fn severity(self) -> Severity {
        match self {
            AlertKind::Failure => Severity::Critical,
            AlertKind::Recovery => Severity::Info,
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertKind::Failure => write!(f, "failure"),
            AlertKind::Recovery => write!(f, "recovery"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Error,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Critical => write!(f, "critical"),
            Severity::Error => write!(f, "error"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// A confirmed health transition of one target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub target: Target,
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    /// The check that caused the transition
    pub result: CheckResult,
    pub raised_at: DateTime<Utc>,
}

impl AlertEvent {
    pub fn new(target: &Target, kind: AlertKind, result: &CheckResult) -> Self {
        let message = match kind {
            AlertKind::Failure => format!("{} service failure (confirmed)", target.name),
            AlertKind::Recovery => format!("{} service recovered", target.name),
        };

        Self {
            target: target.clone(),
            kind,
            severity: kind.severity(),
            message,
            result: result.clone(),
            raised_at: Utc::now(),
        }
    }
}

/// Consumer of alert events. Delivery and retries are up to the implementation.
#[async_trait]
pub trait AlertDispatcher: Send + Sync {
    async fn dispatch(&self, event: AlertEvent) -> anyhow::Result<()>;
}

/// Writes alerts to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDispatcher;

#[async_trait]
impl AlertDispatcher for LogDispatcher {
    async fn dispatch(&self, event: AlertEvent) -> anyhow::Result<()> {
        match event.kind {
            AlertKind::Failure => warn!(
                target_id = %event.target.id,
                url = %event.target.url,
                severity = %event.severity,
                error = %event.result.error_message,
                "{}", event.message
            ),
            AlertKind::Recovery => info!(
                target_id = %event.target.id,
                url = %event.target.url,
                severity = %event.severity,
                response_time_ms = event.result.response_time_ms,
                "{}", event.message
            ),
        }
        Ok(())
    }
}

/// Forwards alerts to a channel drained by a delivery task
#[derive(Debug, Clone)]
pub struct ChannelDispatcher {
    tx: mpsc::Sender<AlertEvent>,
}

impl ChannelDispatcher {
    pub fn new(tx: mpsc::Sender<AlertEvent>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl AlertDispatcher for ChannelDispatcher {
    async fn dispatch(&self, event: AlertEvent) -> anyhow::Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|e| anyhow::anyhow!("Alert channel closed: {}", e))
    }
}
