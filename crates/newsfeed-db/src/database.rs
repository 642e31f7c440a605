use sqlx::{PgPool, Pool, Postgres};
use std::time::Duration;

pub type DatabasePool = Pool<Postgres>;

/// Thin wrapper over a Postgres connection pool plus migration runner.
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(database_url: &str, max_connections: u32, acquire_timeout: Duration) -> anyhow::Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await?;
        Ok(Database { pool })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> DatabasePool {
        self.pool.clone()
    }
}
