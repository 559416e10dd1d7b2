//! Database layer
//!
//! SQLite storage for tenants, users, module entitlements, suspensions,
//! the current-account ledger and the audit log. One repository per
//! aggregate, each borrowing the pool.

pub mod audit_repository;
pub mod ledger_repository;
pub mod module_repository;
pub mod suspension_repository;
pub mod tenant_repository;
pub mod user_repository;

pub use audit_repository::AuditRepository;
pub use ledger_repository::LedgerRepository;
pub use module_repository::ModuleRepository;
pub use suspension_repository::SuspensionRepository;
pub use tenant_repository::TenantRepository;
pub use user_repository::UserRepository;

use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    Pool, Sqlite,
};
use uuid::Uuid;

use crate::config::DatabaseConfig;

/// Database connection pool type
pub type DbPool = Pool<Sqlite>;

/// Initialize the database connection pool and apply migrations
pub async fn init_pool(config: &DatabaseConfig) -> Result<DbPool> {
    let connect_options = config
        .url
        .parse::<SqliteConnectOptions>()
        .context("Failed to parse database URL")?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(config.connect_timeout_secs))
        .foreign_keys(true)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .connect_with(connect_options)
        .await
        .context("Failed to connect to database")?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Apply embedded migrations
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("Failed to run database migrations")
}

/// Liveness probe used by the readiness endpoint
pub async fn ping(pool: &DbPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .context("Database ping failed")?;
    Ok(())
}

pub(crate) fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_else(|_| Uuid::nil())
}

pub(crate) fn parse_opt_uuid(s: Option<&str>) -> Option<Uuid> {
    s.and_then(|s| Uuid::parse_str(s).ok())
}

pub(crate) fn parse_decimal(s: &str) -> rust_decimal::Decimal {
    s.parse().unwrap_or_default()
}

/// Parse a TEXT enum column, logging and falling back on unknown values
pub(crate) fn parse_enum<T>(value: &str, fallback: T) -> T
where
    T: std::str::FromStr<Err = String>,
{
    value.parse().unwrap_or_else(|e| {
        tracing::warn!("{}", e);
        fallback
    })
}
