//! Asynchronous query tracking.
//!
//! - [`JobRegistry`]: concurrent handle-keyed store of in-flight jobs
//! - [`Job`]: one submitted query and its `Running -> Completed | Expired` state
//! - [`progress::estimate`]: elapsed-time progress against a declared duration
//! - [`QueryCatalog`]: the named query classes a caller may submit
//! - [`PollHandler`]: submit/continue entry point over the registry

pub mod catalog;
pub mod job;
pub mod poll;
pub mod progress;
pub mod registry;

pub use catalog::{QueryCatalog, QueryClass};
pub use job::{Job, JobHandle, JobSnapshot, JobStatus};
pub use poll::{PollHandler, PollOutcome, PollRequest};
pub use registry::JobRegistry;
