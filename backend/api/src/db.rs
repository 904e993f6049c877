//! Database layer: pool initialisation, migrations, and call timeouts.

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::errors::{AppError, Result};

/// Upper bound on any single database operation (a whole transaction counts
/// as one operation).
pub const DB_TIMEOUT: Duration = Duration::from_secs(3);

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };

    let options = SqliteConnectOptions::from_str(&url)
        .map_err(AppError::Database)?
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

/// Bound a database future by [`DB_TIMEOUT`].
///
/// An elapsed timeout fails the operation; nothing retries.  Dropping the
/// future rolls back any open transaction inside it.
pub async fn with_timeout<T, F>(fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(DB_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout),
    }
}

/// Epoch seconds, the timestamp representation used across the schema.
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
