use std::time::Duration;

use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

/// Build the PostgreSQL pool for a service. Both services do short,
/// request-scoped queries, so the pool stays small; a checkout that cannot
/// be served within the timeout surfaces as 503 at the API boundary.
pub fn create_pool(database_url: &str) -> DbPool {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = Pool::builder()
        .max_size(5)
        .min_idle(Some(1))
        .connection_timeout(Duration::from_secs(5))
        .test_on_check_out(true)
        .build(manager)
        .expect("database pool construction failed");

    tracing::info!(max_size = 5, "PostgreSQL pool ready");
    pool
}
