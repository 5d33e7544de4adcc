//! # Arbinquer Scheduler
//!
//! One independent worker per feed. Each worker sleeps until its job's
//! `next_run_at`, then runs fetch → detect → render → reconcile and asks the
//! cadence policy when to wake next.
//!
//! ## Architecture
//! ```text
//! SchedulerEngine::start()
//!   ├── worker(arbitration)  FixedClockSlot(:01)
//!   ├── worker(incursions)   FixedClockSlot(:01)
//!   ├── worker(invasions)    FixedInterval(5m)
//!   ├── worker(cycles)       DynamicNextBoundary
//!   └── collector ◀── mpsc ── every finished run → job table
//! ```
//!
//! Workers share nothing mutable. A slow or failing feed only ever delays
//! itself.

pub mod cadence;
pub mod change;
pub mod engine;
pub mod job;

pub use cadence::{Cadence, CadencePolicy};
pub use change::ChangeDetector;
pub use engine::{JobRunner, SchedulerEngine, SchedulerHandle};
pub use job::{FeedJob, JobState, RunOutcome};
