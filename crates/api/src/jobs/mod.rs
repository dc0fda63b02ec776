//! Background job scheduler and job implementations.

mod calendar_backfill;
mod pool_metrics;
mod scheduler;
mod sweep;
mod watch_renewal;

pub use calendar_backfill::CalendarBackfillJob;
pub use pool_metrics::PoolMetricsJob;
pub use scheduler::{Job, JobFrequency, JobScheduler};
pub use sweep::SweepJob;
pub use watch_renewal::WatchRenewalJob;
