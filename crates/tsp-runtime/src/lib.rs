//! `tsp-runtime`: the timed half of transit signal priority.
//!
//! `tsp-core` turns a priority schedule into an install plan; this crate
//! drives a signal controller from that plan.
//!
//! # Architecture
//!
//! ```text
//! UDP datagram (schedule JSON)
//!     │
//!     ▼
//! ScheduleReceiver   ← one document per datagram, bad ones dropped
//!     │
//!     ▼
//! ScheduleManager    ← parse, cancel old jobs, clear, group, install
//!     │
//!     ▼
//! JobScheduler       ← tokio tasks: heartbeats, one-shot clears,
//!     │                 timing-plan refresh, daily jobs
//!     ▼
//! SignalController   ← phase-control registers (MemoryController in tests)
//! ```
//!
//! Every scheduler must be created inside a tokio runtime and stopped with
//! [`ScheduleManager::shutdown`], which clears all phase control on the
//! controller.

pub mod controller;
pub mod error;
pub mod job;
pub mod manager;
pub mod receiver;
pub mod scheduler;

pub use controller::{Actuation, ControllerError, MemoryController, SignalController};
pub use error::{Result, RuntimeError};
pub use job::{JobId, JobKind, ScheduledJob};
pub use manager::{InstallReport, ScheduleManager};
pub use receiver::ScheduleReceiver;
pub use scheduler::JobScheduler;
