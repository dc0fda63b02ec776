//! Query latency and pool gauges.

use metrics::{gauge, histogram};
use sqlx::PgPool;
use std::time::Instant;

const QUERY_DURATION: &str = "db_query_duration_seconds";
const POOL_CONNECTIONS: &str = "db_pool_connections";

/// Times one repository query.
///
/// ```ignore
/// let timer = QueryTimer::new("lock_slot");
/// let result = sqlx::query_as::<_, SlotEntity>(..).fetch_optional(&mut *conn).await;
/// timer.record();
/// result
/// ```
pub struct QueryTimer {
    query: String,
    start: Instant,
}

impl QueryTimer {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            start: Instant::now(),
        }
    }

    pub fn record(self) {
        histogram!(QUERY_DURATION, "query" => self.query)
            .record(self.start.elapsed().as_secs_f64());
    }
}

/// Publishes pool occupancy, labelled by connection state.
pub fn record_pool_metrics(pool: &PgPool) {
    let size = pool.size() as usize;
    let idle = pool.num_idle();

    gauge!(POOL_CONNECTIONS, "state" => "active").set(size.saturating_sub(idle) as f64);
    gauge!(POOL_CONNECTIONS, "state" => "idle").set(idle as f64);
    gauge!(POOL_CONNECTIONS, "state" => "max").set(pool.options().get_max_connections() as f64);
}
