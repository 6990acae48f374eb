//! Unique periodic background work.
//!
//! A job is registered under a name; at most one job per name exists and a
//! job never overlaps with itself. Each run happens on the blocking pool so
//! file and database I/O stay off the async executor.

use std::{collections::HashMap, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::{
    sync::Mutex as AsyncMutex,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::services::power::DeviceState;

/// Result reported by a worker for a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkOutcome {
    Success,
    /// Transient failure; run again after a backoff delay.
    Retry,
    Failure,
}

/// A unit of blocking background work.
pub trait Worker: Send + Sync + 'static {
    fn do_work(&self) -> WorkOutcome;
}

/// Device conditions that must hold before a run starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Constraints {
    pub requires_charging: bool,
}

/// Exponential retry delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Backoff {
    /// Delay before retry number `attempt` (zero based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(30),
            max: Duration::from_secs(5 * 60 * 60),
        }
    }
}

/// Schedule for a recurring job.
#[derive(Debug, Clone, Copy)]
pub struct PeriodicWork {
    pub interval: Duration,
    pub constraints: Constraints,
    pub backoff: Backoff,
    /// How often unmet constraints are re-checked.
    pub constraint_poll: Duration,
}

impl PeriodicWork {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            constraints: Constraints::default(),
            backoff: Backoff::default(),
            constraint_poll: Duration::from_secs(15 * 60),
        }
    }

    pub fn requires_charging(mut self, yes: bool) -> Self {
        self.constraints.requires_charging = yes;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_constraint_poll(mut self, poll: Duration) -> Self {
        self.constraint_poll = poll;
        self
    }
}

/// What to do when a job with the same name is already scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingWorkPolicy {
    Keep,
    Replace,
}

/// Held by a pass for its whole run on the blocking pool. One per name,
/// outliving cancel and replace, so a successor job waits for it.
type PassGuard = Arc<AsyncMutex<()>>;

pub struct WorkScheduler {
    device: Arc<dyn DeviceState>,
    jobs: Mutex<HashMap<String, JoinHandle<()>>>,
    passes: Mutex<HashMap<String, PassGuard>>,
}

impl WorkScheduler {
    pub fn new(device: Arc<dyn DeviceState>) -> Self {
        Self {
            device,
            jobs: Mutex::new(HashMap::new()),
            passes: Mutex::new(HashMap::new()),
        }
    }

    /// Schedule `worker` under `name`. Returns false when `Keep` left an
    /// existing job in place or the interval is zero. Must be called from
    /// within a tokio runtime.
    pub fn enqueue_unique_periodic(
        &self,
        name: &str,
        policy: ExistingWorkPolicy,
        work: PeriodicWork,
        worker: Arc<dyn Worker>,
    ) -> bool {
        if work.interval.is_zero() {
            warn!("refusing to schedule {name} with a zero interval");
            return false;
        }
        let mut jobs = self.jobs.lock();
        if let Some(existing) = jobs.get(name) {
            if !existing.is_finished() {
                match policy {
                    ExistingWorkPolicy::Keep => {
                        debug!("keeping existing schedule for {name}");
                        return false;
                    }
                    ExistingWorkPolicy::Replace => {
                        info!("replacing schedule for {name}");
                        existing.abort();
                    }
                }
            }
        }
        let guard = self
            .passes
            .lock()
            .entry(name.to_string())
            .or_default()
            .clone();
        let handle = tokio::spawn(run_periodic(
            name.to_string(),
            work,
            worker,
            self.device.clone(),
            guard,
        ));
        jobs.insert(name.to_string(), handle);
        info!(
            interval_secs = work.interval.as_secs(),
            requires_charging = work.constraints.requires_charging,
            "scheduled periodic work {name}"
        );
        true
    }

    pub fn is_scheduled(&self, name: &str) -> bool {
        self.jobs
            .lock()
            .get(name)
            .map_or(false, |h| !h.is_finished())
    }

    /// Cancel a job. A run already executing finishes on its own.
    pub fn cancel_unique_work(&self, name: &str) -> bool {
        match self.jobs.lock().remove(name) {
            Some(handle) => {
                handle.abort();
                info!("cancelled periodic work {name}");
                true
            }
            None => false,
        }
    }

    pub fn shutdown(&self) {
        for (_, handle) in self.jobs.lock().drain() {
            handle.abort();
        }
    }
}

impl Drop for WorkScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn wait_for_constraints(work: &PeriodicWork, device: &dyn DeviceState) {
    if !work.constraints.requires_charging {
        return;
    }
    let mut logged = false;
    while !device.is_charging() {
        if !logged {
            debug!("waiting for device to charge");
            logged = true;
        }
        time::sleep(work.constraint_poll).await;
    }
}

async fn run_worker(worker: &Arc<dyn Worker>, guard: &PassGuard) -> WorkOutcome {
    let worker = worker.clone();
    // the permit moves onto the blocking pool so aborting this task cannot
    // release it while the pass is still running
    let permit = guard.clone().lock_owned().await;
    let pass = tokio::task::spawn_blocking(move || {
        let outcome = worker.do_work();
        drop(permit);
        outcome
    });
    match pass.await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!("background worker panicked: {err}");
            WorkOutcome::Failure
        }
    }
}

async fn run_periodic(
    name: String,
    work: PeriodicWork,
    worker: Arc<dyn Worker>,
    device: Arc<dyn DeviceState>,
    guard: PassGuard,
) {
    let mut tick = time::interval(work.interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tick.tick().await;
        let period_start = Instant::now();
        wait_for_constraints(&work, device.as_ref()).await;

        let mut attempt = 0u32;
        loop {
            let run_id = Uuid::new_v4();
            debug!(%run_id, attempt, "starting {name}");
            match run_worker(&worker, &guard).await {
                WorkOutcome::Success => {
                    debug!(%run_id, "{name} succeeded");
                    break;
                }
                WorkOutcome::Failure => {
                    warn!(%run_id, "{name} failed; waiting for next period");
                    break;
                }
                WorkOutcome::Retry => {
                    let delay = work.backoff.delay(attempt);
                    attempt += 1;
                    if period_start.elapsed() + delay >= work.interval {
                        warn!(%run_id, "{name} still failing; retrying next period");
                        break;
                    }
                    info!(%run_id, "{name} will retry in {delay:?}");
                    time::sleep(delay).await;
                    wait_for_constraints(&work, device.as_ref()).await;
                }
            }
        }
    }
}
