use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

pub async fn connect(database_url: &str) -> anyhow::Result<PgPool> {
    let db = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(database_url)
        .await
        .context("connect to database")?;
    Ok(db)
}

/// Applies `migrations/`; failure is logged and the server keeps going.
pub async fn migrate(db: &PgPool) {
    if let Err(e) = sqlx::migrate!("./migrations").run(db).await {
        tracing::warn!(
            error = %e,
            "migration failed; continuing. Signups will fail with 503 unless users.email has a unique constraint"
        );
    }
}
