use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of vehicle phases addressed by a controller ring pair.
pub const PHASE_COUNT: usize = 8;

// ---------------------------------------------------------------------------
// ActionKind
// ---------------------------------------------------------------------------

/// Phase-control action exposed by the signal controller.
///
/// Each action owns its own 8-bit phase-control register on the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    #[serde(alias = "CallVeh")]
    CallVeh,
    #[serde(alias = "CallPed")]
    CallPed,
    #[serde(rename = "forceoff", alias = "force_off", alias = "ForceOff")]
    ForceOff,
    #[serde(rename = "hold", alias = "hold_veh", alias = "HoldVeh")]
    HoldVeh,
    #[serde(alias = "OmitVeh")]
    OmitVeh,
    #[serde(alias = "OmitPed")]
    OmitPed,
}

impl ActionKind {
    pub fn all() -> &'static [ActionKind] {
        &[
            ActionKind::CallVeh,
            ActionKind::CallPed,
            ActionKind::ForceOff,
            ActionKind::HoldVeh,
            ActionKind::OmitVeh,
            ActionKind::OmitPed,
        ]
    }

    /// Actions that describe a sustained controller state rather than a pulse.
    ///
    /// These may continue uninterrupted across a schedule install.
    pub fn is_sustained(self) -> bool {
        matches!(
            self,
            ActionKind::HoldVeh | ActionKind::OmitVeh | ActionKind::OmitPed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::CallVeh => "call_veh",
            ActionKind::CallPed => "call_ped",
            ActionKind::ForceOff => "forceoff",
            ActionKind::HoldVeh => "hold",
            ActionKind::OmitVeh => "omit_veh",
            ActionKind::OmitPed => "omit_ped",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionKind {
    type Err = crate::error::TspError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "call_veh" => Ok(ActionKind::CallVeh),
            "call_ped" => Ok(ActionKind::CallPed),
            "forceoff" | "force_off" => Ok(ActionKind::ForceOff),
            "hold" | "hold_veh" => Ok(ActionKind::HoldVeh),
            "omit_veh" => Ok(ActionKind::OmitVeh),
            "omit_ped" => Ok(ActionKind::OmitPed),
            _ => Err(crate::error::TspError::InvalidSchedule(format!(
                "unknown command type '{s}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Phase bitmask helpers
// ---------------------------------------------------------------------------

/// Bit for `phase` in a phase-control register (bit `phase - 1`).
///
/// Phase 0 is the clear marker and contributes no bit.
pub fn phase_bit(phase: u8) -> u8 {
    debug_assert!(
        usize::from(phase) <= PHASE_COUNT,
        "phase {phase} out of range"
    );
    match phase {
        1..=8 => 1 << (phase - 1),
        _ => 0,
    }
}

/// Decode a phase-control register into ascending phase numbers.
pub fn phases_in_mask(mask: u8) -> Vec<u8> {
    (1..=PHASE_COUNT as u8)
        .filter(|p| mask & phase_bit(*p) != 0)
        .collect()
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// One requested action over a phase set and relative time window (seconds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub action: ActionKind,
    /// Phases 1-8, or `[0]` for an explicit clear.
    pub phases: Vec<u8>,
    pub start_time: f64,
    pub end_time: f64,
}

impl Command {
    pub fn new(action: ActionKind, phases: Vec<u8>, start_time: f64, end_time: f64) -> Self {
        Self {
            action,
            phases,
            start_time,
            end_time,
        }
    }

    /// A command is installable only when its window is non-empty.
    pub fn has_valid_window(&self) -> bool {
        self.start_time < self.end_time
    }

    pub fn is_explicit_clear(&self) -> bool {
        self.phases.as_slice() == [0]
    }
}

// ---------------------------------------------------------------------------
// GroupCommand
// ---------------------------------------------------------------------------

/// A bitmask-encoded actuation covering every command that shares a start
/// time and action.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroupCommand {
    pub action: ActionKind,
    pub phase_bitmask: u8,
    pub start_time: f64,
    pub end_time: f64,
}

impl GroupCommand {
    /// The retraction of `action` at `at` seconds.
    pub fn clear(action: ActionKind, at: f64) -> Self {
        Self {
            action,
            phase_bitmask: 0,
            start_time: at,
            end_time: at,
        }
    }

    pub fn is_clear(&self) -> bool {
        self.phase_bitmask == 0
    }

    pub fn phases(&self) -> Vec<u8> {
        phases_in_mask(self.phase_bitmask)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
