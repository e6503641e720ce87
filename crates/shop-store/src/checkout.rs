use crate::rows::{CartRow, OrderRow};
use crate::{map_sqlx_error, PgStore};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use shop_core::{
    CartLine, CheckoutStore, CheckoutUnit, Currency, NewOrder, Order, Price, ProductId,
    ShopError, ShopResult, UserId,
};
use sqlx::{Postgres, Transaction};

/// A checkout running inside one Postgres transaction.
///
/// The cart rows read by [`CheckoutUnit::cart_snapshot`] stay locked until
/// the transaction ends. Every query, pricing included, runs on the
/// transaction's connection, so a checkout holds exactly one pooled
/// connection. Dropping the unit without committing rolls back.
pub struct PgCheckoutUnit {
    tx: Transaction<'static, Postgres>,
    user_id: UserId,
    currency: Currency,
}

#[async_trait]
impl CheckoutStore for PgStore {
    async fn begin_checkout(&self, user_id: UserId) -> ShopResult<Box<dyn CheckoutUnit>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error(e, "begin checkout"))?;
        Ok(Box::new(PgCheckoutUnit {
            tx,
            user_id,
            currency: self.currency,
        }))
    }
}

#[async_trait]
impl CheckoutUnit for PgCheckoutUnit {
    fn cart_snapshot(&mut self) -> BoxStream<'_, ShopResult<CartLine>> {
        sqlx::query_as::<_, CartRow>(
            "SELECT user_id, product_id, quantity, created_at \
             FROM cart WHERE user_id = $1 \
             ORDER BY created_at, product_id \
             FOR UPDATE",
        )
        .bind(self.user_id.get())
        .fetch(&mut *self.tx)
        .map(|row| {
            row.map_err(|e| map_sqlx_error(e, "read cart"))
                .and_then(CartLine::try_from)
        })
        .boxed()
    }

    async fn price(&mut self, product_id: ProductId) -> ShopResult<Price> {
        let cents: Option<i64> = sqlx::query_scalar("SELECT price_cents FROM products WHERE id = $1")
            .bind(product_id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(e, "price"))?;
        cents
            .map(|cents| Price::from_cents(cents, self.currency))
            .ok_or_else(|| ShopError::not_found("product", product_id))
    }

    async fn create_order(&mut self, order: NewOrder) -> ShopResult<Order> {
        let row = sqlx::query_as::<_, OrderRow>(
            "INSERT INTO orders (user_id, total_cents, currency, status) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, user_id, total_cents, currency, status, created_at",
        )
        .bind(order.user_id.get())
        .bind(order.total.amount)
        .bind(order.total.currency.as_str())
        .bind(order.status.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error(e, "insert order"))?;
        Order::try_from(row)
    }

    async fn clear_cart(&mut self) -> ShopResult<u64> {
        let result = sqlx::query("DELETE FROM cart WHERE user_id = $1")
            .bind(self.user_id.get())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(e, "clear cart"))?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> ShopResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error(e, "commit checkout"))
    }

    async fn rollback(self: Box<Self>) -> ShopResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error(e, "rollback checkout"))
    }
}

#[cfg(test)]
mod tests {
    use crate::{testing, PgStore, PgStoreConfig};
    use shop_core::{
        CartStore, CheckoutCoordinator, Currency, OrderStatus, OrderStore, Price, Principal,
        ShopError,
    };
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    #[ignore = "needs DATABASE_URL"]
    async fn test_checkout_against_postgres() {
        let store = Arc::new(testing::store().await);
        let user = testing::fresh_user();
        let a = testing::product(&store, 1000).await;
        let b = testing::product(&store, 500).await;
        store.add_line(user, a, 2).await.unwrap();
        store.add_line(user, b, 1).await.unwrap();

        let coordinator =
            CheckoutCoordinator::new(store.clone(), store.currency());
        let order = coordinator
            .checkout(&Principal::customer(user))
            .await
            .unwrap();

        assert_eq!(order.total, Price::from_cents(2500, store.currency()));
        assert_eq!(order.status, OrderStatus::NotPaid);
        assert!(store.lines(user).await.unwrap().is_empty());
        assert_eq!(store.list_orders(user).await.unwrap(), vec![order]);
    }

    #[tokio::test]
    #[ignore = "needs DATABASE_URL"]
    async fn test_empty_cart_checkout_against_postgres() {
        let store = Arc::new(testing::store().await);
        let user = testing::fresh_user();
        let coordinator =
            CheckoutCoordinator::new(store.clone(), store.currency());

        let err = coordinator
            .checkout(&Principal::customer(user))
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::EmptyCart));
        assert!(store.list_orders(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore = "needs DATABASE_URL"]
    async fn test_checkout_on_single_connection_pool() {
        dotenvy::dotenv().ok();
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let config = PgStoreConfig {
            max_connections: 1,
            acquire_timeout: Duration::from_secs(2),
            ..PgStoreConfig::default()
        };
        let store = Arc::new(PgStore::connect(&url, config, Currency::USD).await.unwrap());
        store.migrate().await.unwrap();
        let user = testing::fresh_user();
        let product = testing::product(&store, 750).await;
        store.add_line(user, product, 2).await.unwrap();

        let order = CheckoutCoordinator::new(store.clone(), store.currency())
            .checkout(&Principal::customer(user))
            .await
            .unwrap();
        assert_eq!(order.total, Price::from_cents(1500, Currency::USD));
        assert!(store.lines(user).await.unwrap().is_empty());
    }
}
