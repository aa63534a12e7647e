//! Synthetic result datasets.
//!
//! Completed queries are materialized into a [`ResultTicket`] that fully
//! describes their dataset. Redeeming a ticket regenerates the rows
//! deterministically: row `i` holds `i * 10` in a single `int32` column.

pub mod retrieval;
pub mod ticket;

use std::time::Duration;

pub use retrieval::RetrievalHandler;
pub use ticket::{ResultTicket, StaticDataset};

use crate::config::DatasetConfig;
use crate::error::{FlightPollError, Result};
use crate::query::Job;

/// Name of the only column in every dataset.
pub const VALUE_COLUMN: &str = "value";

const VALUE_STEP: i32 = 10;

/// Largest row count whose values all fit in an `int32`.
pub const MAX_ROWS: usize = (i32::MAX / VALUE_STEP) as usize;

/// One emitted slice of a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub index: u64,
    pub values: Vec<i32>,
}

/// How a ticket is served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetPlan {
    pub rows: usize,
    pub delay: Option<Duration>,
    pub batch_rows: usize,
}

impl DatasetPlan {
    pub fn for_ticket(ticket: &ResultTicket, config: &DatasetConfig) -> Self {
        let batch_rows = config.batch_rows.max(1);
        match ticket {
            ResultTicket::Dataset { name } => Self {
                rows: config.sample_rows.min(MAX_ROWS),
                delay: name.is_delayed().then_some(config.sample_delay),
                batch_rows,
            },
            ResultTicket::Query { rows, .. } => Self {
                rows: (*rows).min(MAX_ROWS),
                delay: None,
                batch_rows,
            },
        }
    }

    pub fn batch_count(&self) -> usize {
        self.rows.div_ceil(self.batch_rows)
    }

    /// Batches in emission order. An empty dataset yields no batches.
    pub fn batches(&self) -> impl Iterator<Item = Batch> + '_ {
        (0..self.batch_count()).map(move |index| {
            let start = index * self.batch_rows;
            let end = start.saturating_add(self.batch_rows).min(self.rows);
            Batch {
                index: index as u64,
                values: (start..end).map(value_at).collect(),
            }
        })
    }
}

/// Plans never exceed `MAX_ROWS`, so the fallback is unreachable.
fn value_at(row: usize) -> i32 {
    i32::try_from(row)
        .ok()
        .and_then(|row| row.checked_mul(VALUE_STEP))
        .unwrap_or(i32::MAX)
}

/// Produce the result reference for a finished job.
pub fn materialize(job: &Job) -> Result<ResultTicket> {
    let rows = job.query.rows;
    if rows > MAX_ROWS {
        return Err(FlightPollError::Internal(format!(
            "query {} requested {} rows, more than the {} a result can hold",
            job.query.name, rows, MAX_ROWS
        )));
    }

    Ok(ResultTicket::Query {
        query: job.query.name.clone(),
        job: job.handle.id(),
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{JobHandle, QueryClass};
    use tokio_util::sync::CancellationToken;

    fn job_with_rows(rows: usize) -> Job {
        Job::new(
            JobHandle::new(7),
            QueryClass::new("short", Duration::from_secs(60), rows),
            2,
            CancellationToken::new(),
        )
    }

    #[test]
    fn materialize_encodes_query_identity() {
        let ticket = materialize(&job_with_rows(1_000)).unwrap();
        assert_eq!(
            ticket,
            ResultTicket::Query {
                query: "short".to_string(),
                job: 7,
                rows: 1_000
            }
        );
    }

    #[test]
    fn materialize_rejects_unrepresentable_row_counts() {
        let err = materialize(&job_with_rows(usize::MAX)).unwrap_err();
        assert!(matches!(err, FlightPollError::Internal(_)));
    }

    #[test]
    fn sample_plan_is_immediate_single_batch() {
        let plan = DatasetPlan::for_ticket(
            &ResultTicket::Dataset {
                name: StaticDataset::Sample,
            },
            &DatasetConfig::default(),
        );
        assert_eq!(plan.delay, None);
        let batches: Vec<Batch> = plan.batches().collect();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].values, vec![0, 10, 20, 30, 40, 50, 60, 70, 80, 90]);
    }

    #[test]
    fn delayed_sample_plan_carries_delay() {
        let plan = DatasetPlan::for_ticket(
            &ResultTicket::Dataset {
                name: StaticDataset::SampleDelay,
            },
            &DatasetConfig::default(),
        );
        assert_eq!(plan.delay, Some(Duration::from_secs(70)));
        assert_eq!(plan.rows, 10);
    }

    #[test]
    fn query_plan_splits_into_batches() {
        let config = DatasetConfig {
            batch_rows: 400,
            ..Default::default()
        };
        let plan = DatasetPlan::for_ticket(
            &ResultTicket::Query {
                query: "short".to_string(),
                job: 1,
                rows: 1_000,
            },
            &config,
        );
        let batches: Vec<Batch> = plan.batches().collect();
        let sizes: Vec<usize> = batches.iter().map(|b| b.values.len()).collect();
        assert_eq!(sizes, vec![400, 400, 200]);
        assert_eq!(batches[2].index, 2);
        assert_eq!(batches[2].values[0], 800 * 10);
        assert_eq!(*batches[2].values.last().unwrap(), 999 * 10);
    }

    #[test]
    fn oversized_query_plan_is_clamped() {
        let plan = DatasetPlan::for_ticket(
            &ResultTicket::Query {
                query: "short".to_string(),
                job: 1,
                rows: usize::MAX,
            },
            &DatasetConfig::default(),
        );
        assert_eq!(plan.rows, MAX_ROWS);
    }

    #[test]
    fn values_up_to_max_rows_fit() {
        assert_eq!(value_at(MAX_ROWS - 1), (MAX_ROWS as i32 - 1) * VALUE_STEP);
        assert_eq!(value_at(usize::MAX), i32::MAX);
    }

    #[test]
    fn zero_batch_rows_is_treated_as_one() {
        let config = DatasetConfig {
            batch_rows: 0,
            ..Default::default()
        };
        let plan = DatasetPlan::for_ticket(
            &ResultTicket::Dataset {
                name: StaticDataset::Sample,
            },
            &config,
        );
        assert_eq!(plan.batch_count(), 10);
    }
}
