//! Background execution of submitted queries.
//!
//! Each submitted query gets one [`QueryExecutor`] task, spawned on the
//! registry's task tracker with the job's own cancellation token:
//!
//! 1. Sleep between bounded progress checkpoints
//! 2. Record elapsed-time progress on the job
//! 3. Once the declared duration has elapsed, materialize the result ticket
//! 4. Publish ticket and `Completed` status in a single state write
//!
//! Cancellation (job expiry or server shutdown) stops the loop and leaves the
//! job `Running`, where the poll path's expiry check reclaims it.

pub mod executor;

pub use executor::{ExecutionOutcome, QueryExecutor};
