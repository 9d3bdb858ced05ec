//! upwatch - adaptive uptime monitoring engine for Uppe
//!
//! This library probes HTTP(S) targets, measures protocol-level timings,
//! adapts the polling cadence of every target to its recent health and
//! turns long windows of noisy samples into trustworthy uptime figures.
//!
//! Storage, notification delivery and reporting are collaborators reached
//! through the traits in [`registry`], [`store`] and [`alert`].

pub mod alert;
pub mod check;
pub mod error;
pub mod health;
pub mod probe;
pub mod range;
pub mod registry;
pub mod scheduler;
pub mod sla;
pub mod store;
pub mod target;

// Re-export main types
pub use alert::{AlertDispatcher, AlertEvent, AlertKind, ChannelDispatcher, LogDispatcher};
pub use check::{CheckResult, PhaseTimings, Verdict};
pub use error::{ProbeError, RangeError, TargetError};
pub use health::{HealthState, Transition};
pub use probe::{PerformanceProbe, Probe, ProbeConfig};
pub use range::TimeRange;
pub use registry::{InMemoryRegistry, TargetRegistry};
pub use scheduler::{MonitoringScheduler, MonitoringStats, RuntimeSnapshot, TriggerOutcome};
pub use sla::{SlaReport, SlaStatus};
pub use store::{InMemoryMetricsStore, MetricsStore};
pub use target::{StatusRange, Target, TargetId, TargetStatus, TargetUpdate};

/// Re-export common error types
pub use anyhow;

/// upwatch result type using anyhow for collaborator errors
pub type Result<T> = anyhow::Result<T>;
