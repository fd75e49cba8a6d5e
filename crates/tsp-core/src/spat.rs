//! Phase timing state for SPaT broadcast.
//!
//! The tracker holds green and red end-time bounds for two upcoming cycles,
//! ages them by the wall-clock time between snapshots, and answers per-phase
//! min/max time-to-change queries. All times are deciseconds.
//!
//! Two timing strategies exist. Until a translation config is installed the
//! tracker passes the controller-reported bounds through unchanged. Once
//! initialized, green and red bounds come from the translated schedule while
//! yellow stays controller-reported (clearance is fixed by the controller).

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::command::PHASE_COUNT;
use crate::error::{Result, TspError};

/// Sentinel for "time unavailable" in derived timing lists.
pub const UNKNOWN: f64 = 36001.0;

// ---------------------------------------------------------------------------
// Snapshot interface
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightState {
    Green,
    Yellow,
    Red,
    /// Dark, flashing, or any state the feed does not resolve.
    #[default]
    #[serde(other)]
    Unavailable,
}

/// A decoded phase-timing snapshot from the controller feed.
pub trait PhaseSnapshot {
    fn vehicle_states(&self) -> [LightState; PHASE_COUNT];
    fn min_end_times(&self) -> [f64; PHASE_COUNT];
    fn max_end_times(&self) -> [f64; PHASE_COUNT];
}

/// Plain-data snapshot, used when the feed is delivered as JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpatSnapshot {
    pub vehicle_states: [LightState; PHASE_COUNT],
    pub min_end_times: [f64; PHASE_COUNT],
    pub max_end_times: [f64; PHASE_COUNT],
}

impl PhaseSnapshot for SpatSnapshot {
    fn vehicle_states(&self) -> [LightState; PHASE_COUNT] {
        self.vehicle_states
    }

    fn min_end_times(&self) -> [f64; PHASE_COUNT] {
        self.min_end_times
    }

    fn max_end_times(&self) -> [f64; PHASE_COUNT] {
        self.max_end_times
    }
}

// ---------------------------------------------------------------------------
// Translation config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EndTimes {
    pub max_end_time: [f64; PHASE_COUNT],
    pub min_end_time: [f64; PHASE_COUNT],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CycleEndTimes {
    pub cycle1: EndTimes,
    pub cycle2: EndTimes,
}

/// Schedule-derived phase timing, produced alongside each priority schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TranslationConfig {
    #[serde(default)]
    pub omitted_phases: Vec<u8>,
    pub green_states: CycleEndTimes,
    pub red_states: CycleEndTimes,
}

impl TranslationConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let cfg: TranslationConfig = serde_json::from_str(json)?;
        cfg.check()?;
        Ok(cfg)
    }

    fn check(&self) -> Result<()> {
        if let Some(bad) = self
            .omitted_phases
            .iter()
            .find(|p| !(1..=PHASE_COUNT as u8).contains(*p))
        {
            return Err(TspError::InvalidTranslation(format!(
                "omitted phase {bad} is outside 1-{PHASE_COUNT}"
            )));
        }
        let all_finite = [&self.green_states, &self.red_states]
            .iter()
            .flat_map(|s| [&s.cycle1, &s.cycle2])
            .flat_map(|e| e.min_end_time.iter().chain(e.max_end_time.iter()))
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(TspError::InvalidTranslation(
                "end times must be finite".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Bound tables
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Min,
    Max,
}

/// Min/max end times for one light color across two cycles.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct BoundTable {
    min: [[f64; PHASE_COUNT]; 2],
    max: [[f64; PHASE_COUNT]; 2],
}

impl BoundTable {
    fn from_cycles(cycles: &CycleEndTimes) -> Self {
        Self {
            min: [cycles.cycle1.min_end_time, cycles.cycle2.min_end_time],
            max: [cycles.cycle1.max_end_time, cycles.cycle2.max_end_time],
        }
    }

    fn age(&mut self, timestep: f64) {
        for row in self.min.iter_mut().chain(self.max.iter_mut()) {
            for v in row.iter_mut() {
                *v = (*v - timestep).max(0.0);
            }
        }
    }

    fn get(&self, bound: Bound, cycle: usize, index: usize) -> f64 {
        match bound {
            Bound::Min => self.min[cycle][index],
            Bound::Max => self.max[cycle][index],
        }
    }
}

/// Which source answers timing queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingStrategy {
    ControllerReported,
    ScheduleTranslation,
}

// ---------------------------------------------------------------------------
// SpatTracker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct SpatTracker {
    active: bool,
    omitted: BTreeSet<u8>,
    green: BoundTable,
    red: BoundTable,
    states: [LightState; PHASE_COUNT],
    served: BTreeSet<u8>,
    /// Phase indices already yellow at the first snapshot after initialize.
    yellow_at_start: BTreeSet<usize>,
    awaiting_first: bool,
    prev_timestamp_ds: i64,
    timestep_ds: i64,
}

impl SpatTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initialize(&mut self, config: &TranslationConfig) -> Result<()> {
        self.initialize_at(config, now_deciseconds())
    }

    /// Install `config` with `now_ds` as the reference timestamp.
    pub fn initialize_at(&mut self, config: &TranslationConfig, now_ds: i64) -> Result<()> {
        config.check()?;
        *self = Self {
            active: true,
            omitted: config.omitted_phases.iter().copied().collect(),
            green: BoundTable::from_cycles(&config.green_states),
            red: BoundTable::from_cycles(&config.red_states),
            awaiting_first: true,
            prev_timestamp_ds: now_ds,
            ..Self::default()
        };
        tracing::debug!(omitted = ?self.omitted, "spat tracker initialized");
        Ok(())
    }

    pub fn deactivate(&mut self) {
        *self = Self::default();
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn strategy(&self) -> TimingStrategy {
        if self.active {
            TimingStrategy::ScheduleTranslation
        } else {
            TimingStrategy::ControllerReported
        }
    }

    pub fn timestep_seconds(&self) -> f64 {
        self.timestep_ds as f64 / 10.0
    }

    pub fn served_at_least_once(&self) -> &BTreeSet<u8> {
        &self.served
    }

    pub fn update(&mut self, snapshot: &impl PhaseSnapshot) {
        self.update_at(snapshot, now_deciseconds());
    }

    /// Age every bound by the time since the previous snapshot and record the
    /// snapshot's light states.
    pub fn update_at(&mut self, snapshot: &impl PhaseSnapshot, now_ds: i64) {
        let elapsed = now_ds - self.prev_timestamp_ds;
        if elapsed < 0 {
            tracing::warn!(elapsed, "spat clock moved backwards; treating timestep as zero");
        }
        self.timestep_ds = elapsed.max(0);
        self.prev_timestamp_ds = now_ds;

        let timestep = self.timestep_ds as f64;
        self.green.age(timestep);
        self.red.age(timestep);

        let states = snapshot.vehicle_states();
        if self.awaiting_first {
            self.yellow_at_start = indices_in(&states, LightState::Yellow).collect();
            self.awaiting_first = false;
        } else if !self.yellow_at_start.is_empty() {
            let left_yellow: Vec<usize> = self
                .yellow_at_start
                .iter()
                .copied()
                .filter(|i| states[*i] != LightState::Yellow)
                .collect();
            for index in left_yellow {
                self.yellow_at_start.remove(&index);
            }
        }

        self.states = states;
        for index in indices_in(&states, LightState::Yellow) {
            if !self.yellow_at_start.contains(&index) {
                self.served.insert(index as u8 + 1);
            }
        }
    }

    /// Phase indices (0-based) currently in `state`.
    pub fn phase_indices(&self, state: LightState) -> Vec<usize> {
        indices_in(&self.states, state).collect()
    }

    pub fn vehicle_min_times(&self, snapshot: &impl PhaseSnapshot) -> [f64; PHASE_COUNT] {
        self.vehicle_times(snapshot, Bound::Min)
    }

    pub fn vehicle_max_times(&self, snapshot: &impl PhaseSnapshot) -> [f64; PHASE_COUNT] {
        self.vehicle_times(snapshot, Bound::Max)
    }

    pub fn pedestrian_min_times(&self, _snapshot: &impl PhaseSnapshot) -> [f64; PHASE_COUNT] {
        [UNKNOWN; PHASE_COUNT]
    }

    pub fn pedestrian_max_times(&self, _snapshot: &impl PhaseSnapshot) -> [f64; PHASE_COUNT] {
        [UNKNOWN; PHASE_COUNT]
    }

    fn vehicle_times(&self, snapshot: &impl PhaseSnapshot, bound: Bound) -> [f64; PHASE_COUNT] {
        let reported = match bound {
            Bound::Min => snapshot.min_end_times(),
            Bound::Max => snapshot.max_end_times(),
        };
        match self.strategy() {
            TimingStrategy::ControllerReported => reported,
            TimingStrategy::ScheduleTranslation => {
                std::array::from_fn(|index| self.translated(index, bound, &reported))
            }
        }
    }

    fn translated(&self, index: usize, bound: Bound, reported: &[f64; PHASE_COUNT]) -> f64 {
        debug_assert!(index < PHASE_COUNT, "phase index {index} out of range");
        let phase = index as u8 + 1;
        if self.omitted.contains(&phase) {
            return UNKNOWN;
        }
        // An unserved phase is still in its first observed appearance; once
        // served, the next relevant boundary is in the following cycle.
        let cycle = usize::from(self.served.contains(&phase));
        match self.states[index] {
            LightState::Green => self.green.get(bound, cycle, index),
            LightState::Yellow => reported[index],
            LightState::Red => self.red.get(bound, cycle, index),
            LightState::Unavailable => UNKNOWN,
        }
    }
}

fn indices_in(
    states: &[LightState; PHASE_COUNT],
    state: LightState,
) -> impl Iterator<Item = usize> + '_ {
    states
        .iter()
        .enumerate()
        .filter(move |(_, s)| **s == state)
        .map(|(i, _)| i)
}

fn now_deciseconds() -> i64 {
    chrono::Utc::now().timestamp_millis() / 100
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
