use crate::rows::{OrderRow, PaymentRow};
use crate::{map_sqlx_error, PgStore};
use async_trait::async_trait;
use shop_core::{
    NewPayment, Order, OrderId, PaymentNotification, PaymentRecord, PaymentStatus, PaymentStore,
    ReconcilePlan, Reconciliation, ShopError, ShopResult, UserId,
};

#[async_trait]
impl PaymentStore for PgStore {
    async fn record_pending(&self, payment: NewPayment) -> ShopResult<PaymentRecord> {
        let row = sqlx::query_as::<_, PaymentRow>(
            "INSERT INTO payments \
                (user_id, order_id, amount_cents, currency, status, \
                 transaction_id, payment_method, idempotency_key) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING id, user_id, order_id, amount_cents, currency, status, \
                 transaction_id, payment_method, idempotency_key, created_at",
        )
        .bind(payment.user_id.get())
        .bind(payment.order_id.get())
        .bind(payment.amount.amount)
        .bind(payment.amount.currency.as_str())
        .bind(PaymentStatus::Pending.as_str())
        .bind(payment.transaction_id)
        .bind(payment.payment_method)
        .bind(payment.idempotency_key)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "insert payment"))?;
        PaymentRecord::try_from(row)
    }

    async fn payments_for_order(
        &self,
        user_id: UserId,
        order_id: OrderId,
    ) -> ShopResult<Vec<PaymentRecord>> {
        sqlx::query_as::<_, PaymentRow>(
            "SELECT id, user_id, order_id, amount_cents, currency, status, \
                 transaction_id, payment_method, idempotency_key, created_at \
             FROM payments WHERE user_id = $1 AND order_id = $2 ORDER BY id",
        )
        .bind(user_id.get())
        .bind(order_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "list payments"))?
        .into_iter()
        .map(PaymentRecord::try_from)
        .collect()
    }

    async fn reconcile(&self, notification: &PaymentNotification) -> ShopResult<Reconciliation> {
        let order_id = notification.order_id;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error(e, "begin reconcile"))?;

        // Lock order: payment row first, then its order
        let payment = match notification.transaction_id.as_deref() {
            Some(transaction_id) => sqlx::query_as::<_, PaymentRow>(
                "SELECT id, user_id, order_id, amount_cents, currency, status, \
                     transaction_id, payment_method, idempotency_key, created_at \
                 FROM payments WHERE order_id = $1 AND transaction_id = $2 \
                 ORDER BY id DESC LIMIT 1 \
                 FOR UPDATE",
            )
            .bind(order_id.get())
            .bind(transaction_id),
            None => sqlx::query_as::<_, PaymentRow>(
                "SELECT id, user_id, order_id, amount_cents, currency, status, \
                     transaction_id, payment_method, idempotency_key, created_at \
                 FROM payments WHERE order_id = $1 \
                 ORDER BY id DESC LIMIT 1 \
                 FOR UPDATE",
            )
            .bind(order_id.get()),
        }
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error(e, "lock payment"))?
        .ok_or_else(|| ShopError::not_found("payment", order_id))?;

        let order = sqlx::query_as::<_, OrderRow>(
            "SELECT id, user_id, total_cents, currency, status, created_at \
             FROM orders WHERE id = $1 FOR UPDATE",
        )
        .bind(order_id.get())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error(e, "lock order"))?
        .ok_or_else(|| ShopError::not_found("order", order_id))?;
        let order = Order::try_from(order)?;

        let plan = ReconcilePlan::decide(payment.status()?, order.status, notification.status);
        if plan.is_noop() {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error(e, "release reconcile"))?;
            return Ok(Reconciliation::new(
                PaymentRecord::try_from(payment)?,
                order.status,
                &plan,
            ));
        }

        let payment = match plan.payment {
            Some(status) => sqlx::query_as::<_, PaymentRow>(
                "UPDATE payments SET status = $1, updated_at = NOW() \
                 WHERE id = $2 \
                 RETURNING id, user_id, order_id, amount_cents, currency, status, \
                     transaction_id, payment_method, idempotency_key, created_at",
            )
            .bind(status.as_str())
            .bind(payment.id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(e, "update payment"))?,
            None => payment,
        };

        let order_status = match plan.order {
            Some(next) => {
                sqlx::query("UPDATE orders SET status = $1 WHERE id = $2")
                    .bind(next.as_str())
                    .bind(order_id.get())
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error(e, "update order status"))?;
                next
            }
            None => order.status,
        };

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error(e, "commit reconcile"))?;

        Ok(Reconciliation::new(
            PaymentRecord::try_from(payment)?,
            order_status,
            &plan,
        ))
    }
}
