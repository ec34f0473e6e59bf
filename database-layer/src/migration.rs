// Embedded schema migrations
use crate::error::DatabaseResult;
use sqlx::migrate::Migrator;
use sqlx::PgPool;
use tracing::info;

/// Migrations under `database-layer/migrations`, embedded at compile time
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Apply every pending migration
pub async fn run_migrations(pool: &PgPool) -> DatabaseResult<()> {
    MIGRATOR.run(pool).await?;
    info!(
        migrations = MIGRATOR.iter().count(),
        "Database schema is up to date"
    );
    Ok(())
}
