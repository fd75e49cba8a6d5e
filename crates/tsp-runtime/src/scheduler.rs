//! Timer engine for controller actuation.
//!
//! Every write to a controller's phase-control registers goes through the
//! [`JobScheduler`]. Windowed groups become heartbeat jobs that re-assert
//! their bitmask one second inside the controller's backup time; clears
//! become one-shot jobs. A timing-plan refresh heartbeat runs for the whole
//! lifetime of the scheduler.
//!
//! Register writes are epoch-gated: cancelling the current schedule advances
//! the epoch under the gate lock, so a job from an older schedule can never
//! land a write after the cancel returns.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, warn};
use tsp_core::command::{phases_in_mask, ActionKind, GroupCommand};
use tsp_core::config::ControllerConfig;

use crate::controller::SignalController;
use crate::error::{Result, RuntimeError};
use crate::job::{next_daily_start, IdAllocator, JobId, JobKind, ScheduledJob};

/// Offset applied to jobs due at time zero; the timer only fires in the future.
pub const START_EPSILON: Duration = Duration::from_millis(1);

// ---------------------------------------------------------------------------
// Write gate
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct WriteGate {
    epoch: Mutex<u64>,
}

impl WriteGate {
    fn lock(&self) -> MutexGuard<'_, u64> {
        self.epoch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current(&self) -> u64 {
        *self.lock()
    }

    fn advance(&self) {
        *self.lock() += 1;
    }

    /// Write while holding the gate, but only for the epoch the job belongs to.
    fn write(
        &self,
        epoch: u64,
        controller: &dyn SignalController,
        id: JobId,
        action: ActionKind,
        bitmask: u8,
    ) {
        let current = self.lock();
        if *current != epoch {
            return;
        }
        actuate(controller, Some(id), action, bitmask);
    }
}

fn actuate(controller: &dyn SignalController, id: Option<JobId>, action: ActionKind, bitmask: u8) {
    match controller.set_phase_control(action, bitmask) {
        Ok(()) => debug!(job = ?id.map(JobId::get), %action, bitmask, "phase control written"),
        // Not retried: a missed write lets the controller watchdog revert.
        Err(e) => warn!(job = ?id.map(JobId::get), %action, bitmask, error = %e, "phase control write failed"),
    }
}

// ---------------------------------------------------------------------------
// Job table
// ---------------------------------------------------------------------------

struct LiveJob {
    job: ScheduledJob,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Jobs {
    live: BTreeMap<JobId, LiveJob>,
    ids: IdAllocator,
}

impl Jobs {
    fn prune(&mut self) {
        self.live.retain(|_, j| !j.task.is_finished());
    }

    fn allocate(&mut self) -> Result<JobId> {
        self.prune();
        let live = &self.live;
        self.ids
            .next(|id| live.contains_key(&id))
            .ok_or(RuntimeError::JobIdsExhausted)
    }

    fn insert(&mut self, job: ScheduledJob, task: JoinHandle<()>) -> JobId {
        let id = job.id;
        debug!(job = %id, kind = job.kind.label(), "job scheduled");
        self.live.insert(id, LiveJob { job, task });
        id
    }
}

// ---------------------------------------------------------------------------
// JobScheduler
// ---------------------------------------------------------------------------

pub struct JobScheduler {
    controller: Arc<dyn SignalController>,
    runtime: Handle,
    reassert_every: Duration,
    timing_plan_every: Duration,
    gate: Arc<WriteGate>,
    jobs: Mutex<Jobs>,
    stopped: AtomicBool,
}

impl JobScheduler {
    /// Start the engine on the current tokio runtime and arm the timing-plan
    /// refresh.
    ///
    /// Fails when the controller's backup time leaves no room for a
    /// re-assertion period (backup time below 2 seconds).
    pub fn start(controller: Arc<dyn SignalController>) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| RuntimeError::NoRuntime)?;
        let limits = ControllerConfig {
            backup_time_secs: controller.backup_time_secs(),
            timing_plan_update_interval_secs: controller.timing_plan_update_interval_secs(),
        };
        let reassert_every = limits.reassert_interval()?;
        let timing_plan_every = limits.timing_plan_interval()?;

        let scheduler = Self {
            controller,
            runtime,
            reassert_every,
            timing_plan_every,
            gate: Arc::new(WriteGate::default()),
            jobs: Mutex::new(Jobs::default()),
            stopped: AtomicBool::new(false),
        };
        {
            let mut jobs = scheduler.lock();
            scheduler.arm_timing_refresh(&mut jobs)?;
        }
        info!(
            backup_time_secs = limits.backup_time_secs,
            reassert_secs = reassert_every.as_secs(),
            "job scheduler started"
        );
        Ok(scheduler)
    }

    pub fn reassert_interval(&self) -> Duration {
        self.reassert_every
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Register currently asserted on the controller for `action`.
    pub fn asserted_bits(&self, action: ActionKind) -> Result<u8> {
        Ok(self.controller.phase_control(action)?)
    }

    /// Cancel every schedule job and re-arm the timing-plan refresh.
    ///
    /// Daily jobs are left running. Returns the number of jobs cancelled,
    /// not counting the refresh heartbeat.
    pub fn cancel_schedule_jobs(&self) -> Result<usize> {
        let mut jobs = self.lock();
        if self.is_stopped() {
            return Err(RuntimeError::Stopped);
        }
        self.gate.advance();

        let doomed: Vec<JobId> = jobs
            .live
            .iter()
            .filter(|(_, j)| !j.job.kind.is_background())
            .map(|(id, _)| *id)
            .collect();
        let mut cancelled = 0;
        for id in doomed {
            if let Some(live) = jobs.live.remove(&id) {
                live.task.abort();
                if live.job.kind != JobKind::PeriodicTimingRefresh {
                    cancelled += 1;
                }
            }
        }
        self.arm_timing_refresh(&mut jobs)?;
        debug!(cancelled, "schedule jobs cancelled");
        Ok(cancelled)
    }

    /// Write an empty register for each of `actions`, immediately.
    pub fn clear_actions(&self, actions: &[ActionKind]) {
        let _gate = self.gate.lock();
        for action in actions {
            actuate(&*self.controller, None, *action, 0);
        }
    }

    /// Schedule every group in `plan` relative to now.
    pub fn install_plan(&self, plan: &[GroupCommand]) -> Result<Vec<JobId>> {
        let mut jobs = self.lock();
        if self.is_stopped() {
            return Err(RuntimeError::Stopped);
        }
        let base = Instant::now();
        let epoch = self.gate.current();
        plan.iter()
            .map(|group| self.add_group(&mut jobs, base, epoch, group))
            .collect()
    }

    fn add_group(
        &self,
        jobs: &mut Jobs,
        base: Instant,
        epoch: u64,
        group: &GroupCommand,
    ) -> Result<JobId> {
        let id = jobs.allocate()?;
        let controller = Arc::clone(&self.controller);
        let gate = Arc::clone(&self.gate);
        let action = group.action;
        let start = base + offset(group.start_time);

        if group.is_clear() {
            let job = ScheduledJob::new(id, JobKind::OneShotClear { action }, start, None, None);
            let task = self.runtime.spawn(async move {
                sleep_until(start).await;
                gate.write(epoch, &*controller, id, action, 0);
            });
            return Ok(jobs.insert(job, task));
        }

        let bitmask = group.phase_bitmask;
        let end = base + offset(group.end_time);
        let every = self.reassert_every;
        let job = ScheduledJob::new(
            id,
            JobKind::PeriodicReassert { action, bitmask },
            start,
            Some(end),
            Some(every),
        );
        debug!(
            job = %id,
            %action,
            phases = ?phases_in_mask(bitmask),
            start_secs = group.start_time,
            end_secs = group.end_time,
            "heartbeat armed"
        );
        let task = self.runtime.spawn(async move {
            let mut next = start;
            while next < end {
                sleep_until(next).await;
                gate.write(epoch, &*controller, id, action, bitmask);
                next = next_beat(next, every, Instant::now());
            }
        });
        Ok(jobs.insert(job, task))
    }

    fn arm_timing_refresh(&self, jobs: &mut Jobs) -> Result<JobId> {
        let id = jobs.allocate()?;
        let controller = Arc::clone(&self.controller);
        let every = self.timing_plan_every;
        let first = Instant::now() + every;
        let job = ScheduledJob::new(id, JobKind::PeriodicTimingRefresh, first, None, Some(every));
        let task = self.runtime.spawn(async move {
            let mut next = first;
            loop {
                sleep_until(next).await;
                if let Err(e) = controller.update_and_send_active_timing_plan() {
                    warn!(job = %id, error = %e, "timing plan refresh failed");
                }
                next = next_beat(next, every, Instant::now());
            }
        });
        Ok(jobs.insert(job, task))
    }

    /// Run `work` every day at local `hour:minute`.
    ///
    /// An invalid time falls back to midnight. Daily jobs survive schedule
    /// installs and stop at shutdown.
    pub fn schedule_daily<F>(&self, hour: u32, minute: u32, work: F) -> Result<JobId>
    where
        F: Fn() + Send + 'static,
    {
        let (hour, minute) = if hour < 24 && minute < 60 {
            (hour, minute)
        } else {
            warn!(hour, minute, "invalid daily start time; using midnight");
            (0, 0)
        };

        let mut jobs = self.lock();
        if self.is_stopped() {
            return Err(RuntimeError::Stopped);
        }
        let id = jobs.allocate()?;

        let now = chrono::Local::now().naive_local();
        let mut target = next_daily_start(now, hour, minute);
        let first_wait = (target - now).to_std().unwrap_or(Duration::ZERO);
        let job = ScheduledJob::new(
            id,
            JobKind::Daily { hour, minute },
            Instant::now() + first_wait,
            None,
            Some(Duration::from_secs(24 * 60 * 60)),
        );
        let task = self.runtime.spawn(async move {
            let mut wait = first_wait;
            loop {
                sleep(wait).await;
                work();
                let now = chrono::Local::now().naive_local();
                target = next_daily_start(now.max(target), hour, minute);
                wait = (target - now).to_std().unwrap_or(Duration::ZERO);
            }
        });
        Ok(jobs.insert(job, task))
    }

    /// Snapshot of jobs that have not yet completed, ordered by id.
    pub fn pending_jobs(&self) -> Vec<ScheduledJob> {
        let mut jobs = self.lock();
        jobs.prune();
        jobs.live.values().map(|j| j.job.clone()).collect()
    }

    /// Cancel every job, then clear every action on the controller.
    ///
    /// Idempotent: only the first call acts.
    pub fn shutdown(&self) {
        {
            let mut jobs = self.lock();
            if self.stopped.swap(true, Ordering::SeqCst) {
                return;
            }
            self.gate.advance();
            for (_, live) in std::mem::take(&mut jobs.live) {
                live.task.abort();
            }
        }
        self.clear_actions(ActionKind::all());
        info!("job scheduler stopped; all phase controls cleared");
    }

    fn lock(&self) -> MutexGuard<'_, Jobs> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        let jobs = self.jobs.get_mut().unwrap_or_else(PoisonError::into_inner);
        for live in jobs.live.values() {
            live.task.abort();
        }
    }
}

/// Relative schedule time as a timer offset.
fn offset(secs: f64) -> Duration {
    if secs <= 0.0 {
        START_EPSILON
    } else {
        Duration::from_secs_f64(secs)
    }
}

/// The beat after `prev`, skipping any beats already missed by `now`.
fn next_beat(prev: Instant, every: Duration, now: Instant) -> Instant {
    let mut next = prev + every;
    while next < now {
        next += every;
    }
    next
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
