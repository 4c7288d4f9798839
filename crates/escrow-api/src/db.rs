//! # Database Connection
//!
//! The database is optional. With a URL the service persists escrow action
//! records to Postgres through [`escrow_store::PgActionStore`]; without one
//! it runs on the in-memory store and records do not survive restarts.

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};

/// Connect to Postgres and apply the embedded migrations.
///
/// Returns `None` when `url` is `None`. Returns `Err` if the URL is set but
/// the connection or a migration fails.
pub async fn init_pool(url: Option<&str>) -> Result<Option<PgPool>, sqlx::Error> {
    let Some(url) = url else {
        tracing::warn!(
            "DATABASE_URL not set; running with the in-memory store. \
             Escrow records will not survive restarts."
        );
        return Ok(None);
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .connect(url)
        .await?;
    tracing::info!("Connected to PostgreSQL");

    escrow_store::MIGRATOR.run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(Some(pool))
}

/// Round-trip a trivial query. Used by the readiness probe.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_url_means_no_pool() {
        assert!(init_pool(None).await.unwrap().is_none());
    }
}
