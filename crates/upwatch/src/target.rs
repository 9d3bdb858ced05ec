//! Monitored targets and the derived fields written back after each check.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::error::TargetError;

pub type TargetId = Uuid;

pub const MIN_INTERVAL_SECONDS: u64 = 30;
pub const MAX_INTERVAL_SECONDS: u64 = 3600;
pub const DEFAULT_INTERVAL_SECONDS: u64 = 60;

/// Inclusive range of accepted HTTP status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRange {
    pub min: u16,
    pub max: u16,
}

impl StatusRange {
    pub fn new(min: u16, max: u16) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, status_code: u16) -> bool {
        status_code >= self.min && status_code <= self.max
    }

    fn validate(&self) -> Result<(), TargetError> {
        let bounds = 100..=599;
        if !bounds.contains(&self.min) || !bounds.contains(&self.max) || self.min > self.max {
            return Err(TargetError::InvalidStatusRange { min: self.min, max: self.max });
        }
        Ok(())
    }
}

impl Default for StatusRange {
    fn default() -> Self {
        Self { min: 200, max: 299 }
    }
}

impl fmt::Display for StatusRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

/// Last known outcome of a target, as shown to users
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetStatus {
    #[default]
    Pending,
    Healthy,
    Unhealthy,
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetStatus::Pending => write!(f, "pending"),
            TargetStatus::Healthy => write!(f, "healthy"),
            TargetStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// A monitored URL and its check configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    pub name: String,
    pub url: String,
    pub interval_seconds: u64,
    /// Substring that must appear in the response body
    pub keyword: Option<String>,
    pub status_range: StatusRange,
    pub enabled: bool,
    /// Set only by an explicit resume
    pub last_enabled_at: Option<DateTime<Utc>>,
    /// Set only by an explicit pause
    pub last_disabled_at: Option<DateTime<Utc>>,
    pub last_check: Option<DateTime<Utc>>,
    pub status: TargetStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Target {
    /// Create an enabled target with default settings
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name_from_url(&url),
            url,
            interval_seconds: DEFAULT_INTERVAL_SECONDS,
            keyword: None,
            status_range: StatusRange::default(),
            enabled: true,
            last_enabled_at: None,
            last_disabled_at: None,
            last_check: None,
            status: TargetStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: TargetId) -> Self {
        self.id = id;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_interval(mut self, interval_seconds: u64) -> Self {
        self.interval_seconds = interval_seconds;
        self
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    pub fn with_status_range(mut self, min: u16, max: u16) -> Self {
        self.status_range = StatusRange::new(min, max);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Configured polling interval
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    /// Keyword to look for, ignoring an empty string
    pub fn keyword(&self) -> Option<&str> {
        self.keyword.as_deref().filter(|keyword| !keyword.is_empty())
    }

    /// A target counts as paused before only once both toggles happened.
    pub fn was_ever_paused(&self) -> bool {
        self.last_enabled_at.is_some() && self.last_disabled_at.is_some()
    }

    /// Start of the window that belongs to the current incarnation of the target.
    pub fn active_since(&self) -> Option<DateTime<Utc>> {
        if self.was_ever_paused() {
            self.last_enabled_at
        } else {
            None
        }
    }

    /// Validate URL, interval and status range
    pub fn validate(&self) -> Result<(), TargetError> {
        let url = Url::parse(&self.url).map_err(|e| TargetError::InvalidUrl(e.to_string()))?;

        match url.scheme() {
            "http" | "https" => {}
            other => return Err(TargetError::UnsupportedScheme(other.to_string())),
        }

        if url.host_str().map_or(true, str::is_empty) {
            return Err(TargetError::MissingHost);
        }

        if !(MIN_INTERVAL_SECONDS..=MAX_INTERVAL_SECONDS).contains(&self.interval_seconds) {
            return Err(TargetError::IntervalOutOfRange(self.interval_seconds));
        }

        self.status_range.validate()
    }
}

/// Use the hostname as display name, or the raw string when it does not parse.
fn name_from_url(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

/// Partial update restricted to the fields the scheduler derives
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetUpdate {
    pub last_check: Option<DateTime<Utc>>,
    pub status: Option<TargetStatus>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TargetUpdate {
    /// Fields written back after a completed check
    pub fn after_check(healthy: bool, at: DateTime<Utc>) -> Self {
        Self {
            last_check: Some(at),
            status: Some(if healthy { TargetStatus::Healthy } else { TargetStatus::Unhealthy }),
            updated_at: Some(at),
        }
    }

    pub fn apply(&self, target: &mut Target) {
        if let Some(last_check) = self.last_check {
            target.last_check = Some(last_check);
        }
        if let Some(status) = self.status {
            target.status = status;
        }
        if let Some(updated_at) = self.updated_at {
            target.updated_at = updated_at;
        }
    }
}
