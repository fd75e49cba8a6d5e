//! The signal controller seam.
//!
//! The scheduler only ever talks to a controller through [`SignalController`].
//! The on-wire protocol (NTCIP objects over SNMP) lives behind this trait in
//! the deployment; [`MemoryController`] keeps the registers in memory and is
//! used by the daemon's dry-run mode and by tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tokio::time::Instant;
use tsp_core::command::{phases_in_mask, ActionKind};

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("controller unreachable: {0}")]
    Unreachable(String),
}

/// Phase-control access to a signal controller.
///
/// Implementations must be cheap to call from timer callbacks; every method
/// is invoked synchronously from the scheduler.
pub trait SignalController: Send + Sync {
    /// Overwrite the register for `action` with `bitmask` (bit `p-1` = phase `p`).
    fn set_phase_control(&self, action: ActionKind, bitmask: u8) -> Result<(), ControllerError>;

    /// Currently asserted register for `action`.
    fn phase_control(&self, action: ActionKind) -> Result<u8, ControllerError>;

    /// Watchdog window after which externally asserted bits revert.
    fn backup_time_secs(&self) -> u32;

    fn timing_plan_update_interval_secs(&self) -> u64;

    fn update_and_send_active_timing_plan(&self) -> Result<(), ControllerError>;
}

// ---------------------------------------------------------------------------
// MemoryController
// ---------------------------------------------------------------------------

/// One register write observed by a [`MemoryController`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Actuation {
    pub at: Instant,
    pub action: ActionKind,
    pub bitmask: u8,
}

/// Writes kept by default; older ones are dropped first.
pub const DEFAULT_HISTORY_CAP: usize = 4096;

#[derive(Debug, Default)]
struct Registers {
    bits: HashMap<ActionKind, u8>,
    history: VecDeque<Actuation>,
}

/// In-memory controller that logs every write.
///
/// Only the most recent `history_cap` writes are retained, so a long-running
/// daemon holds bounded memory.
#[derive(Debug)]
pub struct MemoryController {
    backup_time_secs: u32,
    history_cap: usize,
    timing_plan_update_interval_secs: u64,
    registers: Mutex<Registers>,
    timing_plan_sends: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryController {
    pub fn new(backup_time_secs: u32, timing_plan_update_interval_secs: u64) -> Self {
        Self {
            backup_time_secs,
            history_cap: DEFAULT_HISTORY_CAP,
            timing_plan_update_interval_secs,
            registers: Mutex::new(Registers::default()),
            timing_plan_sends: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    pub fn with_history_cap(mut self, cap: usize) -> Self {
        self.history_cap = cap;
        self
    }

    /// Make every subsequent call fail as if the controller went offline.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Preload a register without recording it as an actuation.
    pub fn preset(&self, action: ActionKind, bitmask: u8) {
        self.lock().bits.insert(action, bitmask);
    }

    pub fn history(&self) -> Vec<Actuation> {
        self.lock().history.iter().copied().collect()
    }

    pub fn history_for(&self, action: ActionKind) -> Vec<Actuation> {
        self.lock()
            .history
            .iter()
            .filter(|a| a.action == action)
            .copied()
            .collect()
    }

    pub fn timing_plan_sends(&self) -> usize {
        self.timing_plan_sends.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registers> {
        self.registers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_online(&self) -> Result<(), ControllerError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ControllerError::Unreachable("simulated outage".into()));
        }
        Ok(())
    }
}

impl SignalController for MemoryController {
    fn set_phase_control(&self, action: ActionKind, bitmask: u8) -> Result<(), ControllerError> {
        self.check_online()?;
        let mut regs = self.lock();
        regs.bits.insert(action, bitmask);
        if self.history_cap > 0 {
            while regs.history.len() >= self.history_cap {
                regs.history.pop_front();
            }
            regs.history.push_back(Actuation {
                at: Instant::now(),
                action,
                bitmask,
            });
        }
        tracing::info!(%action, phases = ?phases_in_mask(bitmask), "phase control set");
        Ok(())
    }

    fn phase_control(&self, action: ActionKind) -> Result<u8, ControllerError> {
        self.check_online()?;
        Ok(self.lock().bits.get(&action).copied().unwrap_or(0))
    }

    fn backup_time_secs(&self) -> u32 {
        self.backup_time_secs
    }

    fn timing_plan_update_interval_secs(&self) -> u64 {
        self.timing_plan_update_interval_secs
    }

    fn update_and_send_active_timing_plan(&self) -> Result<(), ControllerError> {
        self.check_online()?;
        self.timing_plan_sends.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("active timing plan sent");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
