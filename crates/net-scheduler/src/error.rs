//! Scheduler-local errors (spec.md §7 `NoValidHost`). Everything else the
//! scheduler surfaces bubbles up from its caller; a per-instance failure in
//! a batch is caught and recorded rather than propagated (spec.md §4.6,
//! §7 "in batch mode, per-instance errors are caught and recorded without
//! aborting the batch").

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("scheduler found no valid host: {reason}")]
    NoValidHost { reason: String },

    #[error("invalid value for scheduler_max_attempts, must be >= 1 (got {0})")]
    InvalidMaxAttempts(u32),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
