pub mod scheduler;

pub use scheduler::{ReminderOutcome, ReminderScheduler, TickSummary};
