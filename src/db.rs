//! Centroid database pool
//!
//! The cluster predictor reads two read-only tables produced by the offline
//! clustering jobs: `cluster_level1` and `cluster_level2`.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    // Read-only inputs: a missing database is an unrecoverable startup failure
    let options = SqliteConnectOptions::from_str(database_url)?.read_only(true);

    SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await
}
