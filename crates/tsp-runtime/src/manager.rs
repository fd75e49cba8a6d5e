//! Schedule install pipeline.
//!
//! A received schedule replaces the previous one wholesale:
//!
//! 1. parse and normalize (a bad document changes nothing),
//! 2. cancel the old schedule's jobs,
//! 3. clear every action the new schedule does not continue,
//! 4. group the commands and install the resulting plan.
//!
//! Installs are serialized; a schedule that arrives mid-install waits for the
//! previous one to finish.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tracing::{info, warn};
use tsp_core::command::{ActionKind, Command, GroupCommand};
use tsp_core::grouper::group_commands;
use tsp_core::installer::plan_clears;
use tsp_core::schedule::{normalize, parse_schedule};

use crate::controller::SignalController;
use crate::error::Result;
use crate::job::{JobId, ScheduledJob};
use crate::scheduler::JobScheduler;

/// Outcome of one schedule install.
#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    /// Actions cleared before the new plan was installed.
    pub cleared: Vec<ActionKind>,
    /// Sustained actions left asserted because the new schedule continues them.
    pub kept: Vec<ActionKind>,
    pub plan: Vec<GroupCommand>,
    #[serde(skip)]
    pub jobs: Vec<JobId>,
    /// Jobs of the previous schedule that were cancelled.
    pub cancelled: usize,
}

pub struct ScheduleManager {
    scheduler: Arc<JobScheduler>,
    install_lock: Mutex<()>,
}

impl ScheduleManager {
    /// Start a scheduler for `controller` on the current runtime.
    pub fn start(controller: Arc<dyn SignalController>) -> Result<Self> {
        Ok(Self::new(Arc::new(JobScheduler::start(controller)?)))
    }

    pub fn new(scheduler: Arc<JobScheduler>) -> Self {
        Self {
            scheduler,
            install_lock: Mutex::new(()),
        }
    }

    pub fn scheduler(&self) -> &Arc<JobScheduler> {
        &self.scheduler
    }

    /// Parse a schedule document and install it.
    ///
    /// A document that fails to parse is rejected before anything is
    /// cancelled, so the running schedule stays in place.
    pub fn process_schedule_json(&self, json: &str) -> Result<InstallReport> {
        let commands = parse_schedule(json)?;
        self.process_schedule(commands)
    }

    /// Replace the active schedule with `commands`.
    ///
    /// Commands with an empty or inverted window are dropped and the rest
    /// ordered by start time before anything is planned.
    pub fn process_schedule(&self, commands: Vec<Command>) -> Result<InstallReport> {
        let commands = normalize(commands);
        let _install = self
            .install_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let cancelled = self.scheduler.cancel_schedule_jobs()?;

        let cleared = plan_clears(&commands, |action| {
            self.scheduler.asserted_bits(action).unwrap_or_else(|e| {
                warn!(%action, error = %e, "could not read phase control; clearing it");
                0
            })
        });
        self.scheduler.clear_actions(&cleared);
        let kept: Vec<ActionKind> = ActionKind::all()
            .iter()
            .copied()
            .filter(|a| !cleared.contains(a))
            .collect();

        let plan = group_commands(commands);
        let jobs = self.scheduler.install_plan(&plan)?;

        info!(
            commands = plan.len(),
            jobs = jobs.len(),
            cancelled,
            cleared = cleared.len(),
            kept = ?kept,
            "schedule installed"
        );
        Ok(InstallReport {
            cleared,
            kept,
            plan,
            jobs,
            cancelled,
        })
    }

    pub fn pending_jobs(&self) -> Vec<ScheduledJob> {
        self.scheduler.pending_jobs()
    }

    pub fn shutdown(&self) {
        let _install = self
            .install_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.scheduler.shutdown();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::MemoryController;
    use crate::error::RuntimeError;
    use crate::job::JobKind;
    use std::time::Duration;
    use tokio::time::{sleep, Instant};
    use tsp_core::command::phase_bit;

    fn manager(backup: u32) -> (Arc<MemoryController>, ScheduleManager) {
        let c = Arc::new(MemoryController::new(backup, 3600));
        let m = ScheduleManager::start(c.clone()).unwrap();
        (c, m)
    }

    const HOLD_2_6: &str = r#"{"Schedule": [
        {"commandPhase": [2, 6], "commandType": "hold", "commandStartTime": 0.0, "commandEndTime": 30.0}
    ]}"#;

    #[tokio::test(start_paused = true)]
    async fn fresh_install_clears_everything_then_holds() {
        let (c, m) = manager(20);
        let report = m.process_schedule_json(HOLD_2_6).unwrap();

        // Nothing asserted yet, so even the requested hold is cleared first.
        assert_eq!(report.cleared.len(), ActionKind::all().len());
        assert!(report.kept.is_empty());
        assert_eq!(report.jobs.len(), 2);
        assert!(c.history().iter().all(|a| a.bitmask == 0));

        sleep(Duration::from_secs(1)).await;
        let holds = c.history_for(ActionKind::HoldVeh);
        assert_eq!(holds.last().unwrap().bitmask, phase_bit(2) | phase_bit(6));
    }

    #[tokio::test(start_paused = true)]
    async fn continued_hold_is_never_dropped_during_install() {
        let (c, m) = manager(20);
        c.preset(ActionKind::HoldVeh, phase_bit(2));

        let report = m.process_schedule_json(HOLD_2_6).unwrap();
        assert_eq!(report.kept, vec![ActionKind::HoldVeh]);
        assert!(!report.cleared.contains(&ActionKind::HoldVeh));
        assert!(c.history_for(ActionKind::HoldVeh).is_empty());

        sleep(Duration::from_secs(40)).await;
        let bits: Vec<u8> = c
            .history_for(ActionKind::HoldVeh)
            .iter()
            .map(|a| a.bitmask)
            .collect();
        let mask = phase_bit(2) | phase_bit(6);
        assert_eq!(bits, vec![mask, mask, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn hold_starting_later_is_cleared_first() {
        let (c, m) = manager(20);
        c.preset(ActionKind::HoldVeh, phase_bit(4));
        let report = m
            .process_schedule_json(
                r#"{"Schedule": [
                    {"commandPhase": 4, "commandType": "hold", "commandStartTime": 5.0, "commandEndTime": 10.0}
                ]}"#,
            )
            .unwrap();
        assert!(report.cleared.contains(&ActionKind::HoldVeh));
        assert_eq!(c.phase_control(ActionKind::HoldVeh).unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_document_leaves_running_schedule_alone() {
        let (c, m) = manager(20);
        m.process_schedule_json(HOLD_2_6).unwrap();
        let before = m.pending_jobs();
        let writes = c.history().len();

        assert!(m.process_schedule_json("{not json").is_err());
        assert!(m
            .process_schedule_json(
                r#"{"Schedule": [
                    {"commandPhase": 12, "commandType": "hold", "commandStartTime": 0.0, "commandEndTime": 5.0}
                ]}"#
            )
            .is_err());

        assert_eq!(m.pending_jobs(), before);
        assert_eq!(c.history().len(), writes);
    }

    #[tokio::test(start_paused = true)]
    async fn new_schedule_replaces_old_jobs() {
        let (c, m) = manager(20);
        m.process_schedule_json(HOLD_2_6).unwrap();
        sleep(Duration::from_secs(1)).await;

        let report = m
            .process_schedule_json(
                r#"{"Schedule": [
                    {"commandPhase": 3, "commandType": "omit_veh", "commandStartTime": 2.0, "commandEndTime": 8.0}
                ]}"#,
            )
            .unwrap();
        assert_eq!(report.cancelled, 2);
        // Hold was asserted by the old schedule and is not continued.
        assert!(report.cleared.contains(&ActionKind::HoldVeh));

        let after_install = Instant::now();
        sleep(Duration::from_secs(60)).await;
        let late_holds: Vec<_> = c
            .history_for(ActionKind::HoldVeh)
            .into_iter()
            .filter(|a| a.at > after_install)
            .collect();
        assert!(late_holds.is_empty());

        let omits: Vec<u8> = c
            .history_for(ActionKind::OmitVeh)
            .iter()
            .map(|a| a.bitmask)
            .collect();
        assert_eq!(omits.last(), Some(&0));
        assert!(omits.contains(&phase_bit(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_schedule_clears_and_keeps_refresh() {
        let (c, m) = manager(20);
        c.preset(ActionKind::OmitPed, 0xff);
        let report = m.process_schedule_json(r#"{"Schedule": []}"#).unwrap();
        assert!(report.plan.is_empty());
        assert_eq!(c.phase_control(ActionKind::OmitPed).unwrap(), 0);

        let pending = m.pending_jobs();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, JobKind::PeriodicTimingRefresh);
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_controller_is_cleared_anyway() {
        let (c, m) = manager(20);
        c.set_failing(true);
        let report = m.process_schedule_json(HOLD_2_6).unwrap();
        assert_eq!(report.cleared.len(), ActionKind::all().len());
    }

    #[tokio::test(start_paused = true)]
    async fn direct_commands_are_normalized_before_grouping() {
        let (c, m) = manager(20);
        let report = m
            .process_schedule(vec![
                Command::new(ActionKind::CallVeh, vec![1], 5.0, 12.0),
                Command::new(ActionKind::HoldVeh, vec![2], 10.0, 4.0),
                Command::new(ActionKind::OmitVeh, vec![3], 7.0, 7.0),
                Command::new(ActionKind::CallVeh, vec![5], 0.0, 12.0),
            ])
            .unwrap();

        assert!(report
            .plan
            .iter()
            .all(|g| g.is_clear() || g.start_time < g.end_time));
        assert!(report
            .plan
            .iter()
            .all(|g| g.action == ActionKind::CallVeh));
        let first = &report.plan[0];
        assert_eq!((first.start_time, first.phases()), (0.0, vec![5]));

        sleep(Duration::from_secs(30)).await;
        assert!(c.history_for(ActionKind::HoldVeh).iter().all(|a| a.bitmask == 0));
        assert!(c.history_for(ActionKind::OmitVeh).iter().all(|a| a.bitmask == 0));
    }

    #[tokio::test(start_paused = true)]
    async fn install_after_shutdown_is_refused() {
        let (_c, m) = manager(20);
        m.shutdown();
        assert!(matches!(
            m.process_schedule_json(HOLD_2_6),
            Err(RuntimeError::Stopped)
        ));
    }
}
