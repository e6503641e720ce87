//! # shop-store
//!
//! PostgreSQL implementation of the storefront storage ports.
//!
//! One [`PgStore`] implements every port in `shop_core::ports`. Every
//! read-then-write (checkout, order transitions, payment reconciliation)
//! runs in a single transaction with the rows it depends on locked
//! `FOR UPDATE`, so concurrent requests on the same order or cart serialize.
//!
//! ## Example
//!
//! ```rust,ignore
//! let store = PgStore::connect(&database_url, PgStoreConfig::default(), Currency::USD).await?;
//! store.migrate().await?;
//! ```

mod cart;
mod checkout;
mod orders;
mod payments;
mod rows;

pub use checkout::PgCheckoutUnit;

use shop_core::{Currency, Price, PricingResolver, ProductId, ShopError, ShopResult};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{error, info};

/// Connection pool settings
#[derive(Debug, Clone)]
pub struct PgStoreConfig {
    /// Maximum number of connections in the pool (default: 10)
    pub max_connections: u32,
    /// Timeout for acquiring a connection from the pool (default: 5 seconds)
    pub acquire_timeout: Duration,
    /// Idle timeout for pooled connections (default: 10 minutes)
    pub idle_timeout: Duration,
}

impl Default for PgStoreConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

/// Postgres-backed catalog pricing, cart, order ledger and payment records
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    currency: Currency,
}

impl PgStore {
    pub async fn connect(
        database_url: &str,
        config: PgStoreConfig,
        currency: Currency,
    ) -> ShopResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .connect(database_url)
            .await
            .map_err(|e| ShopError::Configuration(format!("database connection failed: {e}")))?;
        info!(
            "Connected to Postgres (max_connections={})",
            config.max_connections
        );
        Ok(Self::from_pool(pool, currency))
    }

    /// Use an existing pool, e.g. one shared with other components
    pub fn from_pool(pool: PgPool, currency: Currency) -> Self {
        Self { pool, currency }
    }

    /// Apply the embedded schema migrations
    pub async fn migrate(&self) -> ShopResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ShopError::persistence(format!("migration failed: {e}")))
    }

    pub async fn ping(&self) -> ShopResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| map_sqlx_error(e, "ping"))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Currency every catalog price and order total is held in
    pub fn currency(&self) -> Currency {
        self.currency
    }
}

#[async_trait::async_trait]
impl PricingResolver for PgStore {
    async fn price(&self, product_id: ProductId) -> ShopResult<Price> {
        let cents: Option<i64> = sqlx::query_scalar("SELECT price_cents FROM products WHERE id = $1")
            .bind(product_id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "price"))?;
        cents
            .map(|cents| Price::from_cents(cents, self.currency))
            .ok_or_else(|| ShopError::not_found("product", product_id))
    }
}

/// Log the driver error and reduce it to a `Persistence` error.
///
/// Lookups that can legitimately miss use `fetch_optional` and report
/// `NotFound` themselves; a stray `RowNotFound` is still mapped to it.
pub(crate) fn map_sqlx_error(error: sqlx::Error, operation: &'static str) -> ShopError {
    if let sqlx::Error::RowNotFound = error {
        return ShopError::not_found("row", operation);
    }
    error!(
        error = %error,
        operation,
        "[postgres.database_error] database operation failed"
    );
    ShopError::persistence(format!("{operation}: {error}"))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use shop_core::UserId;

    /// Store on a migrated scratch database named by `DATABASE_URL`
    pub async fn store() -> PgStore {
        dotenvy::dotenv().ok();
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let store = PgStore::connect(&url, PgStoreConfig::default(), Currency::USD)
            .await
            .expect("connect");
        store.migrate().await.expect("migrate");
        store
    }

    /// Users are not a table here; random ids keep test runs apart
    pub fn fresh_user() -> UserId {
        UserId((uuid::Uuid::new_v4().as_u64_pair().0 >> 2) as i64)
    }

    pub async fn product(store: &PgStore, cents: i64) -> ProductId {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO products (name, price_cents) VALUES ('test product', $1) RETURNING id",
        )
        .bind(cents)
        .fetch_one(store.pool())
        .await
        .expect("insert product");
        ProductId(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "needs DATABASE_URL"]
    async fn test_price_reads_catalog() {
        let store = testing::store().await;
        store.ping().await.unwrap();
        let product = testing::product(&store, 1250).await;
        assert_eq!(
            store.price(product).await.unwrap(),
            Price::from_cents(1250, Currency::USD)
        );
        assert!(matches!(
            store.price(ProductId(-1)).await.unwrap_err(),
            ShopError::NotFound { .. }
        ));
    }
}
