use crate::rows::CartRow;
use crate::{map_sqlx_error, PgStore};
use async_trait::async_trait;
use shop_core::{CartLine, CartStore, ProductId, ShopError, ShopResult, UserId};

#[async_trait]
impl CartStore for PgStore {
    async fn add_line(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> ShopResult<CartLine> {
        let quantity = i32::try_from(quantity)
            .map_err(|_| ShopError::InvalidInput(format!("quantity too large: {quantity}")))?;
        let row = sqlx::query_as::<_, CartRow>(
            "INSERT INTO cart (user_id, product_id, quantity) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, product_id) \
             DO UPDATE SET quantity = cart.quantity + EXCLUDED.quantity \
             RETURNING user_id, product_id, quantity, created_at",
        )
        .bind(user_id.get())
        .bind(product_id.get())
        .bind(quantity)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "upsert cart line"))?;
        CartLine::try_from(row)
    }

    async fn lines(&self, user_id: UserId) -> ShopResult<Vec<CartLine>> {
        sqlx::query_as::<_, CartRow>(
            "SELECT user_id, product_id, quantity, created_at \
             FROM cart WHERE user_id = $1 ORDER BY created_at, product_id",
        )
        .bind(user_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "read cart"))?
        .into_iter()
        .map(CartLine::try_from)
        .collect()
    }

    async fn remove_line(&self, user_id: UserId, product_id: ProductId) -> ShopResult<()> {
        let result = sqlx::query("DELETE FROM cart WHERE user_id = $1 AND product_id = $2")
            .bind(user_id.get())
            .bind(product_id.get())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "remove cart line"))?;
        if result.rows_affected() == 0 {
            return Err(ShopError::not_found("cart line", product_id));
        }
        Ok(())
    }
}
