//! Row shapes as read from Postgres, and their conversion into core types.

use chrono::{DateTime, Utc};
use shop_core::{
    CartLine, Currency, Order, OrderId, OrderStatus, PaymentId, PaymentRecord, PaymentStatus,
    Price, ProductId, ShopError, ShopResult, UserId,
};

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct OrderRow {
    pub id: i64,
    pub user_id: i64,
    pub total_cents: i64,
    pub currency: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = ShopError;

    fn try_from(row: OrderRow) -> ShopResult<Self> {
        let currency: Currency = row.currency.parse().map_err(corrupt("orders.currency"))?;
        Ok(Order {
            id: OrderId(row.id),
            user_id: UserId(row.user_id),
            total: Price::from_cents(row.total_cents, currency),
            status: row
                .status
                .parse::<OrderStatus>()
                .map_err(corrupt("orders.status"))?,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PaymentRow {
    pub id: i64,
    pub user_id: i64,
    pub order_id: i64,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub transaction_id: Option<String>,
    pub payment_method: Option<String>,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PaymentRow {
    pub fn status(&self) -> ShopResult<PaymentStatus> {
        self.status.parse().map_err(corrupt("payments.status"))
    }
}

impl TryFrom<PaymentRow> for PaymentRecord {
    type Error = ShopError;

    fn try_from(row: PaymentRow) -> ShopResult<Self> {
        let status = row.status()?;
        let currency: Currency = row.currency.parse().map_err(corrupt("payments.currency"))?;
        Ok(PaymentRecord {
            id: PaymentId(row.id),
            user_id: UserId(row.user_id),
            order_id: OrderId(row.order_id),
            amount: Price::from_cents(row.amount_cents, currency),
            status,
            transaction_id: row.transaction_id,
            payment_method: row.payment_method,
            idempotency_key: row.idempotency_key,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CartRow {
    pub user_id: i64,
    pub product_id: i64,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<CartRow> for CartLine {
    type Error = ShopError;

    fn try_from(row: CartRow) -> ShopResult<Self> {
        let quantity = u32::try_from(row.quantity).map_err(|_| {
            ShopError::persistence(format!("cart.quantity out of range: {}", row.quantity))
        })?;
        Ok(CartLine {
            user_id: UserId(row.user_id),
            product_id: ProductId(row.product_id),
            quantity,
            created_at: row.created_at,
        })
    }
}

/// Stored values that no longer parse are a storage fault, not caller input
fn corrupt(column: &'static str) -> impl Fn(ShopError) -> ShopError {
    move |err| ShopError::persistence(format!("unreadable {column}: {err}"))
}
