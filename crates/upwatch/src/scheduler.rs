//! Adaptive per-target scheduler.
//!
//! Every scheduled target owns one runtime entry holding its health state, an
//! in-flight marker and at most one pending timer. A timer fires one check
//! cycle: probe, state machine, alert, persistence, reschedule. The delay of
//! the next timer follows [`HealthState::poll_interval`].
//!
//! Entries carry a generation number. A cycle that started under an entry
//! which was later stopped (and maybe restarted) sees a different generation
//! and leaves the new entry alone.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::alert::{AlertDispatcher, AlertEvent, AlertKind};
use crate::check::CheckResult;
use crate::error::{ProbeError, TargetError};
use crate::health::{HealthState, Transition};
use crate::probe::Probe;
use crate::registry::TargetRegistry;
use crate::store::MetricsStore;
use crate::target::{Target, TargetId, TargetUpdate};

/// Result of asking for an immediate check
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    /// A check ran and the next one is scheduled
    Completed {
        state: HealthState,
        healthy: bool,
        alert: Option<AlertKind>,
    },
    /// A check for this target was already running; nothing was queued
    SkippedInFlight,
    /// The target has no runtime entry, or it was discarded during the check
    NotScheduled,
}

/// Point-in-time view of one runtime entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeSnapshot {
    pub target_id: TargetId,
    pub state: HealthState,
    pub in_flight: bool,
    pub next_interval: Duration,
    pub last_checked: Option<DateTime<Utc>>,
}

/// Aggregate view over all runtime entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonitoringStats {
    pub scheduled: usize,
    pub normal: usize,
    pub suspicious: usize,
    pub down: usize,
    pub in_flight: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleOrigin {
    Timer,
    Manual,
}

struct RuntimeEntry {
    generation: u64,
    target: Target,
    state: HealthState,
    in_flight: bool,
    next_interval: Duration,
    last_checked: Option<DateTime<Utc>>,
    timer: Option<JoinHandle<()>>,
}

impl RuntimeEntry {
    fn snapshot(&self) -> RuntimeSnapshot {
        RuntimeSnapshot {
            target_id: self.target.id,
            state: self.state,
            in_flight: self.in_flight,
            next_interval: self.next_interval,
            last_checked: self.last_checked,
        }
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

struct Inner {
    registry: Arc<dyn TargetRegistry>,
    probe: Arc<dyn Probe>,
    store: Arc<dyn MetricsStore>,
    dispatcher: Arc<dyn AlertDispatcher>,
    entries: Mutex<HashMap<TargetId, RuntimeEntry>>,
    generations: AtomicU64,
}

/// Monitoring scheduler - owns the timers and health state of every target
#[derive(Clone)]
pub struct MonitoringScheduler {
    inner: Arc<Inner>,
}

impl MonitoringScheduler {
    pub fn new(
        registry: Arc<dyn TargetRegistry>,
        probe: Arc<dyn Probe>,
        store: Arc<dyn MetricsStore>,
        dispatcher: Arc<dyn AlertDispatcher>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                probe,
                store,
                dispatcher,
                entries: Mutex::new(HashMap::new()),
                generations: AtomicU64::new(0),
            }),
        }
    }

    /// Begin monitoring a target in the `normal` state. The first check runs
    /// one configured interval from now. An existing entry for the same
    /// target is replaced. Disabled targets are not scheduled.
    pub async fn start(&self, target: Target) -> Result<(), TargetError> {
        target.validate()?;
        if !target.enabled {
            debug!(target_id = %target.id, "Target disabled, not scheduling");
            return Ok(());
        }

        let id = target.id;
        let interval = target.interval();
        let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed) + 1;

        let mut entries = self.inner.entries.lock().await;
        if let Some(mut previous) = entries.remove(&id) {
            previous.cancel_timer();
        }

        let mut entry = RuntimeEntry {
            generation,
            target,
            state: HealthState::Normal,
            in_flight: false,
            next_interval: interval,
            last_checked: None,
            timer: None,
        };
        entry.timer = Some(schedule(&self.inner, id, generation, interval));

        info!(target_id = %id, url = %entry.target.url, interval_secs = interval.as_secs(), "Monitoring started");
        entries.insert(id, entry);
        Ok(())
    }

    /// Cancel the pending timer and discard runtime state. A check already in
    /// flight finishes but is not rescheduled. Returns whether an entry existed.
    pub async fn stop(&self, id: TargetId) -> bool {
        let removed = self.inner.entries.lock().await.remove(&id);
        match removed {
            Some(mut entry) => {
                entry.cancel_timer();
                info!(target_id = %id, "Monitoring stopped");
                true
            }
            None => false,
        }
    }

    pub async fn stop_all(&self) {
        let drained: Vec<_> = self.inner.entries.lock().await.drain().collect();
        let count = drained.len();
        for (_, mut entry) in drained {
            entry.cancel_timer();
        }
        info!(count, "Stopped all monitoring");
    }

    /// Schedule every enabled target known to the registry
    pub async fn start_all(&self) -> Result<usize> {
        let targets = self.inner.registry.get_all().await?;
        let mut started = 0;

        for target in targets.into_iter().filter(|t| t.enabled) {
            let id = target.id;
            match self.start(target).await {
                Ok(()) => started += 1,
                Err(e) => warn!(target_id = %id, error = %e, "Skipping invalid target"),
            }
        }

        info!(count = started, "Monitoring scheduled for enabled targets");
        Ok(started)
    }

    /// Stop everything and restart from the registry's current enabled set
    pub async fn reload(&self) -> Result<usize> {
        info!("Reloading monitoring schedule");
        self.stop_all().await;
        self.start_all().await
    }

    /// Run a check now instead of waiting for the timer. The pending timer is
    /// replaced by the one the completed check schedules.
    ///
    /// The cycle runs on its own task: dropping the returned future does not
    /// cancel the check or its rescheduling.
    pub async fn trigger(&self, id: TargetId) -> TriggerOutcome {
        let generation = match self.inner.entries.lock().await.get(&id) {
            Some(entry) => entry.generation,
            None => return TriggerOutcome::NotScheduled,
        };
        let cycle = tokio::spawn(run_cycle(Arc::clone(&self.inner), id, generation, CycleOrigin::Manual));
        match cycle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(target_id = %id, error = %e, "Manual check task failed");
                TriggerOutcome::NotScheduled
            }
        }
    }

    pub async fn snapshot(&self, id: TargetId) -> Option<RuntimeSnapshot> {
        self.inner.entries.lock().await.get(&id).map(RuntimeEntry::snapshot)
    }

    pub async fn snapshots(&self) -> Vec<RuntimeSnapshot> {
        self.inner.entries.lock().await.values().map(RuntimeEntry::snapshot).collect()
    }

    pub async fn is_scheduled(&self, id: TargetId) -> bool {
        self.inner.entries.lock().await.contains_key(&id)
    }

    pub async fn stats(&self) -> MonitoringStats {
        let entries = self.inner.entries.lock().await;
        let mut stats = MonitoringStats { scheduled: entries.len(), ..Default::default() };

        for entry in entries.values() {
            match entry.state {
                HealthState::Normal => stats.normal += 1,
                HealthState::Suspicious => stats.suspicious += 1,
                HealthState::Down => stats.down += 1,
            }
            if entry.in_flight {
                stats.in_flight += 1;
            }
        }

        stats
    }
}

fn schedule(inner: &Arc<Inner>, id: TargetId, generation: u64, delay: Duration) -> JoinHandle<()> {
    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        run_cycle(inner, id, generation, CycleOrigin::Timer).await;
    })
}

/// One check cycle. Boxed because the timer task it schedules runs it again.
fn run_cycle(
    inner: Arc<Inner>,
    id: TargetId,
    generation: u64,
    origin: CycleOrigin,
) -> BoxFuture<'static, TriggerOutcome> {
    Box::pin(async move {
        let cached = {
            let mut entries = inner.entries.lock().await;
            let Some(entry) = entries.get_mut(&id).filter(|e| e.generation == generation) else {
                return TriggerOutcome::NotScheduled;
            };
            if entry.in_flight {
                debug!(target_id = %id, "Check already in flight, skipping");
                return TriggerOutcome::SkippedInFlight;
            }
            match origin {
                // Our own handle; aborting it would cancel this cycle
                CycleOrigin::Timer => drop(entry.timer.take()),
                CycleOrigin::Manual => entry.cancel_timer(),
            }
            entry.in_flight = true;
            entry.target.clone()
        };

        let target = match inner.registry.get_by_id(id).await {
            Ok(Some(target)) if target.enabled => target,
            Ok(_) => {
                discard(&inner, id, generation).await;
                info!(target_id = %id, "Target removed or disabled, monitoring stopped");
                return TriggerOutcome::NotScheduled;
            }
            Err(e) => {
                warn!(target_id = %id, error = %e, "Registry lookup failed, using cached target");
                cached
            }
        };

        let result = execute(&inner, &target).await;
        debug!(
            target_id = %id,
            healthy = result.is_healthy,
            status_code = result.status_code,
            response_time_ms = result.response_time_ms,
            "Check completed"
        );

        let transition = {
            let mut entries = inner.entries.lock().await;
            let Some(entry) = entries.get_mut(&id).filter(|e| e.generation == generation) else {
                debug!(target_id = %id, "Runtime entry discarded during check, dropping result");
                return TriggerOutcome::NotScheduled;
            };
            let transition = Transition::evaluate(entry.state, result.is_healthy);
            entry.state = transition.to;
            entry.target = target.clone();
            entry.last_checked = Some(result.timestamp);
            transition
        };

        if transition.is_change() {
            info!(target_id = %id, from = %transition.from, to = %transition.to, "Health state changed");
        }

        if let Some(kind) = transition.alert {
            let event = AlertEvent::new(&target, kind, &result);
            if let Err(e) = inner.dispatcher.dispatch(event).await {
                warn!(target_id = %id, error = %e, "Failed to dispatch alert");
            }
        }

        persist(&inner, &target, &result).await;

        let mut entries = inner.entries.lock().await;
        let Some(entry) = entries.get_mut(&id).filter(|e| e.generation == generation) else {
            return TriggerOutcome::NotScheduled;
        };
        let delay = entry.state.poll_interval(target.interval());
        entry.in_flight = false;
        entry.next_interval = delay;
        entry.cancel_timer();
        entry.timer = Some(schedule(&inner, id, generation, delay));
        debug!(target_id = %id, state = %entry.state, delay_secs = delay.as_secs(), "Next check scheduled");

        TriggerOutcome::Completed {
            state: entry.state,
            healthy: result.is_healthy,
            alert: transition.alert,
        }
    })
}

/// Run the probe in its own task so that a panic becomes an unhealthy result
async fn execute(inner: &Arc<Inner>, target: &Target) -> CheckResult {
    let probe = Arc::clone(&inner.probe);
    let owned = target.clone();

    match tokio::spawn(async move { probe.check(&owned).await }).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => CheckResult::from_error(e),
        Err(e) => CheckResult::from_error(ProbeError::Aborted(e.to_string())),
    }
}

async fn persist(inner: &Arc<Inner>, target: &Target, result: &CheckResult) {
    if let Err(e) = inner.store.write(target.id, &target.url, result).await {
        error!(target_id = %target.id, error = %e, "Failed to store check result");
    }

    let update = TargetUpdate::after_check(result.is_healthy, Utc::now());
    if let Err(e) = inner.registry.update(target.id, update).await {
        error!(target_id = %target.id, error = %e, "Failed to update target status");
    }
}

async fn discard(inner: &Arc<Inner>, id: TargetId, generation: u64) {
    let mut entries = inner.entries.lock().await;
    if entries.get(&id).is_some_and(|e| e.generation == generation) {
        if let Some(mut entry) = entries.remove(&id) {
            entry.cancel_timer();
        }
    }
}
