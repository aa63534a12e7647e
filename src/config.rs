use std::net::SocketAddr;
use std::time::Duration;

use crate::query::QueryCatalog;

/// Tunables for job expiry and executor cadence.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPolicy {
    /// A job expires `expiry_factor` declared durations after submission.
    pub expiry_factor: u32,
    /// Upper bound on progress updates per job.
    pub max_checkpoints: u32,
    /// At most one checkpoint per this much declared duration.
    pub checkpoint_period: Duration,
    /// Highest progress reported for a job that has not completed.
    pub running_progress_ceiling: f64,
    /// Registry capacity.
    pub max_jobs: usize,
}

impl Default for QueryPolicy {
    fn default() -> Self {
        Self {
            expiry_factor: 2,
            max_checkpoints: 10,
            checkpoint_period: Duration::from_secs(10),
            running_progress_ceiling: 0.99,
            max_jobs: 10_000,
        }
    }
}

impl QueryPolicy {
    /// Number of progress checkpoints for a job of the given duration.
    ///
    /// `min(max_checkpoints, duration / checkpoint_period)`, never below one.
    pub fn checkpoints_for(&self, declared: Duration) -> u32 {
        let by_period = if self.checkpoint_period.is_zero() {
            u64::from(self.max_checkpoints)
        } else {
            (declared.as_millis() / self.checkpoint_period.as_millis().max(1)) as u64
        };
        by_period.min(u64::from(self.max_checkpoints)).max(1) as u32
    }
}

/// Static dataset and batching settings for the retrieval path.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetConfig {
    /// Rows in the `sample` and `sample-delay` datasets.
    pub sample_rows: usize,
    /// Wait before the first `sample-delay` batch.
    pub sample_delay: Duration,
    /// Maximum rows per emitted batch.
    pub batch_rows: usize,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            sample_rows: 10,
            // Longer than a 60s load balancer idle timeout
            sample_delay: Duration::from_secs(70),
            batch_rows: 500,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub dashboard_addr: Option<SocketAddr>,
    /// Location advertised in result endpoints (host:port).
    pub advertised_location: String,
    pub policy: QueryPolicy,
    pub catalog: QueryCatalog,
    pub datasets: DatasetConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let listen_addr = SocketAddr::from(([127, 0, 0, 1], 8815));
        Self {
            advertised_location: format!("grpc://{}", listen_addr),
            listen_addr,
            dashboard_addr: None,
            policy: QueryPolicy::default(),
            catalog: QueryCatalog::default(),
            datasets: DatasetConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            advertised_location: format!("grpc://{}", listen_addr),
            ..Default::default()
        }
    }

    pub fn with_dashboard(mut self, addr: SocketAddr) -> Self {
        self.dashboard_addr = Some(addr);
        self
    }

    pub fn with_policy(mut self, policy: QueryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_catalog(mut self, catalog: QueryCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_datasets(mut self, datasets: DatasetConfig) -> Self {
        self.datasets = datasets;
        self
    }
}
