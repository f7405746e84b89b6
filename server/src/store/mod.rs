//! Durable persistence over PostgreSQL. `Store` wraps the connection pool;
//! every other component reaches the database only through it. Submodules
//! group queries by entity but all extend the same `impl Store` surface.

pub mod api_keys;
pub mod audit;
pub mod devices;
mod error;
pub mod health;
pub mod inbound;
pub mod outbound;
pub mod pair_codes;
pub mod tenants;
pub mod webhooks;

pub use error::{StoreError, StoreResult};

use sqlx::postgres::{PgPool, PgPoolOptions};

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Wraps an already-migrated pool. Used by integration tests, which
    /// manage the pool's lifecycle (and migrations) through `sqlx::test`.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|err| StoreError::Db(sqlx::Error::Migrate(Box::new(err))))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
