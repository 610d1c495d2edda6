//! CLI subcommands.

pub mod migrate;
pub mod seed;

use secrecy::SecretString;
use sqlx::PgPool;

use print_shop_commerce::config::{ConfigError, get_database_url};
use print_shop_commerce::db::create_pool;

/// Errors shared by the database commands.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Repository(#[from] print_shop_commerce::store::RepositoryError),
}

/// Connect using `DATABASE_URL`, loading `.env` first.
async fn connect() -> Result<PgPool, CommandError> {
    dotenvy::dotenv().ok();

    let database_url: SecretString = get_database_url("DATABASE_URL")?;
    tracing::info!("Connecting to database...");
    Ok(create_pool(&database_url).await?)
}
