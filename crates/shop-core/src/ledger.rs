//! # Order Ledger
//!
//! Lookups and status changes on stored orders. Customer operations are
//! scoped to the caller's own orders; the unconstrained status set needs an
//! [`AdminPrincipal`].

use crate::error::ShopResult;
use crate::ids::OrderId;
use crate::order::{Order, OrderStatus, Transition};
use crate::ports::OrderStore;
use crate::principal::{AdminPrincipal, Principal};
use std::sync::Arc;
use tracing::{info, instrument};

pub struct OrderLedger {
    store: Arc<dyn OrderStore>,
}

impl OrderLedger {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    /// One of the caller's orders; other users' orders are `NotFound`
    pub async fn get(&self, principal: &Principal, order_id: OrderId) -> ShopResult<Order> {
        self.store
            .fetch_order(order_id, Some(principal.user_id()))
            .await
    }

    /// The caller's orders in creation order
    pub async fn list(&self, principal: &Principal) -> ShopResult<Vec<Order>> {
        self.store.list_orders(principal.user_id()).await
    }

    /// Cancel one of the caller's orders.
    ///
    /// Rejected with `InvalidTransition` once the order is `Shipped` or
    /// `Delivered`. Cancelling an already cancelled order returns it unchanged.
    #[instrument(skip(self, principal), fields(user_id = %principal.user_id()))]
    pub async fn cancel(&self, principal: &Principal, order_id: OrderId) -> ShopResult<Order> {
        let order = self
            .store
            .transition(order_id, Some(principal.user_id()), Transition::cancel())
            .await?;
        info!("Order {} cancelled", order.id);
        Ok(order)
    }

    /// Set any status from the closed set, regardless of the current one
    #[instrument(skip(self, admin), fields(admin_id = %admin.user_id()))]
    pub async fn set_status(
        &self,
        admin: &AdminPrincipal,
        order_id: OrderId,
        status: OrderStatus,
    ) -> ShopResult<Order> {
        let order = self
            .store
            .transition(order_id, None, Transition::to(status))
            .await?;
        info!("Order {} set to {}", order.id, order.status);
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ShopError;
    use crate::ids::UserId;
    use crate::memory::MemoryStore;
    use crate::money::{Currency, Price};
    use crate::order::NewOrder;
    use crate::ports::CheckoutStore;

    async fn place(store: &MemoryStore, user: i64) -> Order {
        let mut unit = store.begin_checkout(UserId(user)).await.unwrap();
        let order = unit
            .create_order(NewOrder::new(UserId(user), Price::new(25.0, Currency::USD)))
            .await
            .unwrap();
        unit.commit().await.unwrap();
        order
    }

    fn admin() -> AdminPrincipal {
        Principal::admin(UserId(99)).into_admin().unwrap()
    }

    #[tokio::test]
    async fn test_list_is_empty_not_absent() {
        let ledger = OrderLedger::new(Arc::new(MemoryStore::default()));
        let orders = ledger.list(&Principal::customer(UserId(1))).await.unwrap();
        assert!(orders.is_empty());
    }

    #[tokio::test]
    async fn test_list_in_creation_order() {
        let store = Arc::new(MemoryStore::default());
        let first = place(&store, 1).await;
        place(&store, 2).await;
        let second = place(&store, 1).await;

        let ledger = OrderLedger::new(store);
        let orders = ledger.list(&Principal::customer(UserId(1))).await.unwrap();
        assert_eq!(orders, vec![first, second]);
    }

    #[tokio::test]
    async fn test_get_other_users_order_is_not_found() {
        let store = Arc::new(MemoryStore::default());
        let order = place(&store, 1).await;
        let ledger = OrderLedger::new(store);

        let err = ledger
            .get(&Principal::customer(UserId(2)), order.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::NotFound { .. }));
        assert!(ledger.get(&Principal::customer(UserId(1)), order.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancel_shipped_order_rejected() {
        let store = Arc::new(MemoryStore::default());
        let order = place(&store, 1).await;
        let ledger = OrderLedger::new(store);
        ledger
            .set_status(&admin(), order.id, OrderStatus::Shipped)
            .await
            .unwrap();

        let err = ledger
            .cancel(&Principal::customer(UserId(1)), order.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::InvalidTransition { .. }));

        let unchanged = ledger.get(&Principal::customer(UserId(1)), order.id).await.unwrap();
        assert_eq!(unchanged.status, OrderStatus::Shipped);
    }

    #[tokio::test]
    async fn test_cancel_touches_only_target_order() {
        let store = Arc::new(MemoryStore::default());
        let target = place(&store, 1).await;
        let other = place(&store, 1).await;
        let ledger = OrderLedger::new(store);
        let user = Principal::customer(UserId(1));

        let cancelled = ledger.cancel(&user, target.id).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(ledger.get(&user, other.id).await.unwrap().status, OrderStatus::NotPaid);

        // Re-cancel is idempotent
        let again = ledger.cancel(&user, target.id).await.unwrap();
        assert_eq!(again.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_admin_set_status_missing_order() {
        let ledger = OrderLedger::new(Arc::new(MemoryStore::default()));
        let err = ledger
            .set_status(&admin(), OrderId(404), OrderStatus::Paid)
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_admin_can_reopen_delivered_order() {
        let store = Arc::new(MemoryStore::default());
        let order = place(&store, 1).await;
        let ledger = OrderLedger::new(store);

        ledger
            .set_status(&admin(), order.id, OrderStatus::Delivered)
            .await
            .unwrap();
        let reopened = ledger
            .set_status(&admin(), order.id, OrderStatus::Pending)
            .await
            .unwrap();
        assert_eq!(reopened.status, OrderStatus::Pending);
    }
}
