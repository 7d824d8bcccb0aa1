use sea_orm::{ConnectOptions, Database, DatabaseConnection};

use crate::config::Config;
use crate::error::{AppError, AppResult};

pub async fn connect(config: &Config) -> AppResult<DatabaseConnection> {
    let mut options = ConnectOptions::new(config.database_url.clone());
    options.sqlx_logging(false);

    Database::connect(options)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to connect to database: {}", e)))
}

/// In-memory SQLite database with the full schema applied.
#[cfg(test)]
pub(crate) async fn test_connection() -> DatabaseConnection {
    use sea_orm_migration::MigratorTrait;

    // A single pooled connection keeps every query on the same in-memory database
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);

    let db = Database::connect(options)
        .await
        .expect("Failed to open in-memory database");
    migration::Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");
    db
}

/// Migrated PostgreSQL database from `TEST_DATABASE_URL`, when one is configured.
///
/// Row-locking behaviour only shows up on a real server, so the race tests
/// run against this and are skipped without it.
#[cfg(test)]
pub(crate) async fn test_postgres_connection() -> Option<DatabaseConnection> {
    use sea_orm_migration::MigratorTrait;

    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let mut options = ConnectOptions::new(url);
    options.max_connections(8).sqlx_logging(false);

    let db = Database::connect(options)
        .await
        .expect("Failed to connect to TEST_DATABASE_URL");

    // Tests share the server; apply the schema once per test binary
    static MIGRATED: tokio::sync::OnceCell<()> = tokio::sync::OnceCell::const_new();
    MIGRATED
        .get_or_init(|| async {
            migration::Migrator::up(&db, None)
                .await
                .expect("Failed to run migrations");
        })
        .await;

    Some(db)
}
