//! Inbound priority schedule documents.
//!
//! A schedule arrives as `{"Schedule": [ {commandPhase, commandType,
//! commandStartTime, commandEndTime}, ... ]}`. Parsing is all-or-nothing: a
//! single malformed entry rejects the whole document so that the caller can
//! leave the previously installed schedule untouched.

use serde::{Deserialize, Serialize};

use crate::command::{ActionKind, Command, PHASE_COUNT};
use crate::error::{Result, TspError};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleDocument {
    #[serde(rename = "Schedule")]
    pub schedule: Vec<RawCommand>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCommand {
    pub command_phase: PhaseSpec,
    pub command_type: ActionKind,
    pub command_start_time: f64,
    pub command_end_time: f64,
}

/// `commandPhase` is either a single phase or a list of phases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PhaseSpec {
    One(u8),
    Many(Vec<u8>),
}

impl PhaseSpec {
    fn into_vec(self) -> Vec<u8> {
        match self {
            PhaseSpec::One(p) => vec![p],
            PhaseSpec::Many(ps) => ps,
        }
    }
}

impl RawCommand {
    fn into_command(self) -> Result<Command> {
        let phases = self.command_phase.into_vec();
        if phases.is_empty() {
            return Err(TspError::InvalidSchedule(format!(
                "{} command has an empty phase list",
                self.command_type
            )));
        }
        if let Some(bad) = phases.iter().find(|p| usize::from(**p) > PHASE_COUNT) {
            return Err(TspError::InvalidPhase(*bad));
        }
        if !self.command_start_time.is_finite() || !self.command_end_time.is_finite() {
            return Err(TspError::InvalidSchedule(format!(
                "{} command has a non-finite time window",
                self.command_type
            )));
        }
        if self.command_start_time < 0.0 {
            return Err(TspError::InvalidSchedule(format!(
                "{} command starts before the schedule ({}s)",
                self.command_type, self.command_start_time
            )));
        }
        Ok(Command::new(
            self.command_type,
            phases,
            self.command_start_time,
            self.command_end_time,
        ))
    }
}

// ---------------------------------------------------------------------------
// Parsing + normalization
// ---------------------------------------------------------------------------

/// Parse a schedule document and return its normalized command sequence.
pub fn parse_schedule(json: &str) -> Result<Vec<Command>> {
    let doc: ScheduleDocument = serde_json::from_str(json)?;
    from_document(doc)
}

/// Same as [`parse_schedule`] for an already-decoded JSON value.
pub fn parse_schedule_value(value: serde_json::Value) -> Result<Vec<Command>> {
    let doc: ScheduleDocument = serde_json::from_value(value)?;
    from_document(doc)
}

fn from_document(doc: ScheduleDocument) -> Result<Vec<Command>> {
    let commands = doc
        .schedule
        .into_iter()
        .map(RawCommand::into_command)
        .collect::<Result<Vec<_>>>()?;
    Ok(normalize(commands))
}

/// Drop commands whose window is empty or inverted, then order by start time.
///
/// The sort is stable: commands with equal start times keep input order.
pub fn normalize(commands: Vec<Command>) -> Vec<Command> {
    let mut kept: Vec<Command> = commands
        .into_iter()
        .filter(Command::has_valid_window)
        .collect();
    kept.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
    kept
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
