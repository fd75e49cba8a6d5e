//! Job data model for the timer engine.
//!
//! A `ScheduledJob` is the unit of timed work: a trigger (when to fire, and
//! how often) paired with what it does to the controller. The scheduler owns
//! every live job; callers only ever see snapshots.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, NaiveTime, Utc};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tsp_core::command::ActionKind;

// ---------------------------------------------------------------------------
// JobId
// ---------------------------------------------------------------------------

/// Highest id handed out before wrapping back to 1.
pub const MAX_JOB_ID: u16 = 65534;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u16);

impl JobId {
    pub fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sequential ids in `1..=MAX_JOB_ID`, wrapping to 1.
///
/// An id still held by a live job is skipped, so wraparound never aliases two
/// running jobs.
#[derive(Debug, Default)]
pub struct IdAllocator {
    last: u16,
}

impl IdAllocator {
    pub fn next(&mut self, is_live: impl Fn(JobId) -> bool) -> Option<JobId> {
        for _ in 0..MAX_JOB_ID {
            self.last = if self.last >= MAX_JOB_ID {
                1
            } else {
                self.last + 1
            };
            let id = JobId(self.last);
            if !is_live(id) {
                return Some(id);
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// JobKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// Single write of an empty register.
    OneShotClear { action: ActionKind },
    /// Heartbeat re-assertion of `bitmask` inside the controller watchdog.
    PeriodicReassert { action: ActionKind, bitmask: u8 },
    /// Recurring re-send of the active timing plan.
    PeriodicTimingRefresh,
    /// Caller-supplied work once a day at a local wall-clock time.
    Daily { hour: u32, minute: u32 },
}

impl JobKind {
    /// Jobs that outlive a schedule install.
    pub fn is_background(&self) -> bool {
        matches!(self, JobKind::Daily { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobKind::OneShotClear { .. } => "one_shot_clear",
            JobKind::PeriodicReassert { .. } => "periodic_reassert",
            JobKind::PeriodicTimingRefresh => "periodic_timing_refresh",
            JobKind::Daily { .. } => "daily",
        }
    }
}

// ---------------------------------------------------------------------------
// ScheduledJob
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledJob {
    pub id: JobId,
    pub kind: JobKind,
    pub first_fire: Instant,
    /// Exclusive bound for periodic jobs; `None` runs until cancelled.
    pub last_fire: Option<Instant>,
    pub repeat: Option<Duration>,
    pub created_at: DateTime<Utc>,
}

impl ScheduledJob {
    pub fn new(
        id: JobId,
        kind: JobKind,
        first_fire: Instant,
        last_fire: Option<Instant>,
        repeat: Option<Duration>,
    ) -> Self {
        Self {
            id,
            kind,
            first_fire,
            last_fire,
            repeat,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Daily trigger
// ---------------------------------------------------------------------------

/// Next occurrence of `hour:minute`: today's, or tomorrow's once today's has
/// been reached.
///
/// An out-of-range hour or minute falls back to midnight.
pub fn next_daily_start(now: NaiveDateTime, hour: u32, minute: u32) -> NaiveDateTime {
    let at = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN);
    let today = now.date().and_time(at);
    if now >= today {
        today + ChronoDuration::days(1)
    } else {
        today
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 14)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn ids_start_at_one_and_wrap_after_max() {
        let mut ids = IdAllocator::default();
        assert_eq!(ids.next(|_| false).unwrap().get(), 1);
        assert_eq!(ids.next(|_| false).unwrap().get(), 2);

        let mut ids = IdAllocator {
            last: MAX_JOB_ID - 1,
        };
        assert_eq!(ids.next(|_| false).unwrap().get(), MAX_JOB_ID);
        assert_eq!(ids.next(|_| false).unwrap().get(), 1);
    }

    #[test]
    fn live_ids_are_skipped_on_wraparound() {
        let mut ids = IdAllocator { last: MAX_JOB_ID };
        let id = ids.next(|id| id.get() == 1 || id.get() == 2).unwrap();
        assert_eq!(id.get(), 3);
    }

    #[test]
    fn allocation_fails_only_when_every_id_is_live() {
        let mut ids = IdAllocator::default();
        assert!(ids.next(|_| true).is_none());
    }

    #[test]
    fn daily_start_later_today() {
        assert_eq!(next_daily_start(at(6, 0), 7, 31), at(7, 31));
    }

    #[test]
    fn daily_start_already_passed_moves_to_tomorrow() {
        let next = next_daily_start(at(7, 31), 7, 31);
        assert_eq!(next, at(7, 31) + ChronoDuration::days(1));
        let next = next_daily_start(at(9, 0), 7, 31);
        assert_eq!(next, at(7, 31) + ChronoDuration::days(1));
    }

    #[test]
    fn invalid_daily_time_defaults_to_midnight() {
        let next = next_daily_start(at(12, 0), 24, 0);
        assert_eq!(next, at(0, 0) + ChronoDuration::days(1));
        let next = next_daily_start(at(12, 0), 3, 60);
        assert_eq!(next, at(0, 0) + ChronoDuration::days(1));
    }

    #[test]
    fn only_daily_jobs_are_background() {
        assert!(JobKind::Daily { hour: 0, minute: 0 }.is_background());
        assert!(!JobKind::PeriodicTimingRefresh.is_background());
        assert!(!JobKind::OneShotClear {
            action: ActionKind::CallVeh
        }
        .is_background());
    }
}
