use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbBackend, DbErr, Statement};
use sea_orm::ConnectionTrait;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Configuration for database connection
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

/// Establishes a connection pool to the database.
pub async fn establish_connection(database_url: &str) -> Result<DbPool, DbErr> {
    let config = DbConfig {
        url: database_url.to_string(),
        ..Default::default()
    };
    establish_connection_with_config(&config).await
}

/// Establishes a connection pool with custom configuration.
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, DbErr> {
    debug!("configuring database connection with: {:?}", config);

    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(true);

    info!(
        "connecting to database with max_connections={}",
        config.max_connections
    );

    let db_pool = Database::connect(opt).await?;

    if db_pool.get_database_backend() == DbBackend::Postgres {
        let sql = "SET statement_timeout = 30000".to_string();
        if let Err(e) = db_pool
            .execute(Statement::from_string(DbBackend::Postgres, sql))
            .await
        {
            warn!("failed to set statement timeout: {}", e);
        }
    }

    info!("database connection pool established successfully");
    Ok(db_pool)
}

/// Configuration for database retry logic.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(max_retries: u32, max_delay: Duration) -> Self {
        Self {
            max_retries,
            max_delay,
            ..Default::default()
        }
    }
}

/// Determines if a database error is retryable (transient).
fn is_retryable_error(err: &DbErr) -> bool {
    match err {
        DbErr::Conn(_) => true,
        DbErr::ConnectionAcquire(_) => true,
        DbErr::Query(runtime_err) => {
            let msg = runtime_err.to_string().to_lowercase();
            msg.contains("connection")
                || msg.contains("timeout")
                || msg.contains("broken pipe")
                || msg.contains("reset by peer")
                || msg.contains("deadlock")
        }
        _ => false,
    }
}

/// Executes a database operation with retry logic and exponential backoff.
///
/// Used by the use-case retry wrapper (§4.4) so that the same backoff
/// discipline covers both store contention and ordinary transient I/O errors.
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut f: F,
) -> Result<T, DbErr>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbErr>>,
{
    let mut attempts = 0;
    let mut delay = config.initial_delay;

    loop {
        attempts += 1;

        match f().await {
            Ok(result) => {
                if attempts > 1 {
                    info!(
                        operation = %operation_name,
                        attempts,
                        "database operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if attempts >= config.max_retries || !is_retryable_error(&err) {
                    error!(
                        operation = %operation_name,
                        attempts,
                        error = %err,
                        "database operation failed, not retrying further"
                    );
                    return Err(err);
                }

                warn!(
                    operation = %operation_name,
                    attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retryable database error, backing off"
                );

                sleep(delay).await;
                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * config.backoff_multiplier)
                        .min(config.max_delay.as_secs_f64()),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn with_retry_succeeds_after_transient_errors() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig {
            max_retries: 5,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
        };

        let result = with_retry(&config, "test_op", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(DbErr::Conn(sea_orm::RuntimeErr::Internal(
                        "connection reset".into(),
                    )))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn with_retry_gives_up_on_non_retryable_error() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::default();

        let result: Result<(), DbErr> = with_retry(&config, "test_op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(DbErr::RecordNotFound("missing".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
