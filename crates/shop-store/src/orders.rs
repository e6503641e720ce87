use crate::rows::OrderRow;
use crate::{map_sqlx_error, PgStore};
use async_trait::async_trait;
use shop_core::{Order, OrderId, OrderStore, ShopError, ShopResult, Transition, UserId};
use tracing::debug;

#[async_trait]
impl OrderStore for PgStore {
    async fn fetch_order(&self, order_id: OrderId, owner: Option<UserId>) -> ShopResult<Order> {
        let row = sqlx::query_as::<_, OrderRow>(
            "SELECT id, user_id, total_cents, currency, status, created_at \
             FROM orders \
             WHERE id = $1 AND ($2::BIGINT IS NULL OR user_id = $2)",
        )
        .bind(order_id.get())
        .bind(owner.map(UserId::get))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "fetch order"))?
        .ok_or_else(|| ShopError::not_found("order", order_id))?;
        Order::try_from(row)
    }

    async fn list_orders(&self, user_id: UserId) -> ShopResult<Vec<Order>> {
        sqlx::query_as::<_, OrderRow>(
            "SELECT id, user_id, total_cents, currency, status, created_at \
             FROM orders WHERE user_id = $1 ORDER BY id",
        )
        .bind(user_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "list orders"))?
        .into_iter()
        .map(Order::try_from)
        .collect()
    }

    async fn transition(
        &self,
        order_id: OrderId,
        owner: Option<UserId>,
        transition: Transition,
    ) -> ShopResult<Order> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error(e, "begin transition"))?;

        let current = sqlx::query_as::<_, OrderRow>(
            "SELECT id, user_id, total_cents, currency, status, created_at \
             FROM orders \
             WHERE id = $1 AND ($2::BIGINT IS NULL OR user_id = $2) \
             FOR UPDATE",
        )
        .bind(order_id.get())
        .bind(owner.map(UserId::get))
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error(e, "lock order"))?
        .ok_or_else(|| ShopError::not_found("order", order_id))?;
        let current = Order::try_from(current)?;

        // A rejected transition drops `tx`, which rolls back and releases the lock
        transition.check(current.status)?;
        if current.status == transition.target {
            debug!("Order {} already {}", order_id, current.status);
            return Ok(current);
        }

        let row = sqlx::query_as::<_, OrderRow>(
            "UPDATE orders SET status = $1 WHERE id = $2 \
             RETURNING id, user_id, total_cents, currency, status, created_at",
        )
        .bind(transition.target.as_str())
        .bind(order_id.get())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error(e, "update order status"))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error(e, "commit transition"))?;
        Order::try_from(row)
    }
}
