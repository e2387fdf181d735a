// src/schedule/mod.rs

//! Cron-style scheduling.
//!
//! - [`expression`] parses schedule expressions and computes next occurrences.
//! - [`timer`] runs one driver task per registered entry.
//! - [`scheduler`] ties timers to the task store and the executor.

pub mod expression;
pub mod scheduler;
pub mod timer;

pub use expression::Schedule;
pub use scheduler::Scheduler;
pub use timer::{TimerEngine, TimerJob};
