//! # Checkout Coordinator
//!
//! Turns a user's cart into a priced `NotPaid` order:
//!
//! 1. read the cart snapshot (locked for the rest of the unit)
//! 2. price every line at the current catalog price, through the unit
//! 3. insert the order with the computed total
//! 4. clear the cart
//! 5. commit
//!
//! Steps 1-4 run inside one [`CheckoutUnit`]. Any failure before the commit
//! rolls the unit back, leaving no order and the cart untouched. The only
//! partial outcome is a clear-cart failure whose rollback also fails; that is
//! reported as [`ShopError::ResidualInconsistency`] and logged on the
//! `shop::residual` target.

use crate::error::{ShopError, ShopResult};
use crate::ids::ProductId;
use crate::money::{Currency, Price};
use crate::order::{NewOrder, Order};
use crate::order::CartLine;
use crate::ports::{CheckoutStore, CheckoutUnit};
use crate::principal::Principal;
use futures::TryStreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Default bound on a single price lookup
pub const DEFAULT_PRICING_TIMEOUT: Duration = Duration::from_secs(2);

pub struct CheckoutCoordinator {
    store: Arc<dyn CheckoutStore>,
    currency: Currency,
    pricing_timeout: Duration,
}

impl CheckoutCoordinator {
    pub fn new(store: Arc<dyn CheckoutStore>, currency: Currency) -> Self {
        Self {
            store,
            currency,
            pricing_timeout: DEFAULT_PRICING_TIMEOUT,
        }
    }

    /// Builder: set the per-lookup pricing timeout
    pub fn with_pricing_timeout(mut self, timeout: Duration) -> Self {
        self.pricing_timeout = timeout;
        self
    }

    /// Place an order from everything currently in the caller's cart
    #[instrument(skip(self, principal), fields(user_id = %principal.user_id()))]
    pub async fn checkout(&self, principal: &Principal) -> ShopResult<Order> {
        let user_id = principal.user_id();
        let mut unit = self.store.begin_checkout(user_id).await?;

        let (total, lines) = match self.price_cart(unit.as_mut()).await {
            Ok(priced) => priced,
            Err(e) => return Err(abandon(unit, e).await),
        };

        let order = match unit.create_order(NewOrder::new(user_id, total)).await {
            Ok(order) => order,
            Err(e) => return Err(abandon(unit, e).await),
        };

        if let Err(clear_err) = unit.clear_cart().await {
            return Err(match unit.rollback().await {
                Ok(()) => {
                    warn!("Cart clear failed, order {} rolled back: {}", order.id, clear_err);
                    clear_err
                }
                Err(rollback_err) => {
                    error!(
                        target: "shop::residual",
                        order_id = %order.id,
                        user_id = %user_id,
                        "Order committed state unknown after failed cart clear: clear={}, rollback={}",
                        clear_err,
                        rollback_err
                    );
                    ShopError::ResidualInconsistency {
                        order_id: order.id,
                        reason: clear_err.to_string(),
                    }
                }
            });
        }

        unit.commit().await?;

        info!(
            "Placed order {}: {} lines, total={}",
            order.id,
            lines,
            order.total.display()
        );
        Ok(order)
    }

    /// Sum of unit price times quantity over the snapshot, and the line count
    async fn price_cart(&self, unit: &mut dyn CheckoutUnit) -> ShopResult<(Price, usize)> {
        let snapshot: Vec<CartLine> = unit.cart_snapshot().try_collect().await?;
        if snapshot.is_empty() {
            return Err(ShopError::EmptyCart);
        }

        let mut total = Price::zero(self.currency);
        for line in &snapshot {
            let unit_price = self.resolve_price(unit, line.product_id).await?;
            total = total.checked_add(&unit_price.times(line.quantity)?)?;
            debug!(
                "Priced product {} x{} at {}",
                line.product_id,
                line.quantity,
                unit_price.display()
            );
        }
        Ok((total, snapshot.len()))
    }

    async fn resolve_price(
        &self,
        unit: &mut dyn CheckoutUnit,
        product_id: ProductId,
    ) -> ShopResult<Price> {
        let pricing_err = |source: ShopError| ShopError::Pricing {
            product_id,
            source: Box::new(source),
        };

        let price = tokio::time::timeout(self.pricing_timeout, unit.price(product_id))
            .await
            .map_err(|_| {
                pricing_err(ShopError::Timeout {
                    operation: "pricing",
                    after: self.pricing_timeout,
                })
            })?
            .map_err(&pricing_err)?;

        if price.currency != self.currency {
            return Err(pricing_err(ShopError::InvalidInput(format!(
                "priced in {}, orders are in {}",
                price.currency, self.currency
            ))));
        }
        Ok(price)
    }
}

/// Roll the unit back and hand the original error on
async fn abandon(unit: Box<dyn CheckoutUnit>, err: ShopError) -> ShopError {
    if let Err(rollback_err) = unit.rollback().await {
        warn!("Rollback after failed checkout step also failed: {}", rollback_err);
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{OrderId, ProductId, UserId};
    use crate::memory::{Fault, MemoryStore};
    use crate::order::OrderStatus;
    use crate::ports::{CartStore, OrderStore};
    use async_trait::async_trait;
    use futures::stream::BoxStream;

    fn store_with_cart() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::default());
        store.set_price(ProductId(1), Price::new(10.0, Currency::USD));
        store.set_price(ProductId(2), Price::new(5.0, Currency::USD));
        store
    }

    fn coordinator(store: &Arc<MemoryStore>) -> CheckoutCoordinator {
        CheckoutCoordinator::new(store.clone(), Currency::USD)
    }

    async fn fill_cart(store: &MemoryStore, user: i64) {
        store.add_line(UserId(user), ProductId(1), 2).await.unwrap();
        store.add_line(UserId(user), ProductId(2), 1).await.unwrap();
    }

    #[tokio::test]
    async fn test_checkout_prices_cart_and_clears_it() {
        let store = store_with_cart();
        fill_cart(&store, 1).await;

        let order = coordinator(&store)
            .checkout(&Principal::customer(UserId(1)))
            .await
            .unwrap();

        assert_eq!(order.total, Price::new(25.0, Currency::USD));
        assert_eq!(order.status, OrderStatus::NotPaid);
        assert_eq!(order.user_id, UserId(1));
        assert!(store.lines(UserId(1)).await.unwrap().is_empty());
        assert_eq!(store.list_orders(UserId(1)).await.unwrap(), vec![order]);
    }

    #[tokio::test]
    async fn test_checkout_uses_price_at_call_time() {
        let store = store_with_cart();
        fill_cart(&store, 1).await;
        store.set_price(ProductId(1), Price::new(12.5, Currency::USD));

        let order = coordinator(&store)
            .checkout(&Principal::customer(UserId(1)))
            .await
            .unwrap();
        assert_eq!(order.total.amount, 3000);
    }

    #[tokio::test]
    async fn test_empty_cart_creates_no_order() {
        let store = store_with_cart();

        let err = coordinator(&store)
            .checkout(&Principal::customer(UserId(1)))
            .await
            .unwrap_err();

        assert!(matches!(err, ShopError::EmptyCart));
        assert!(store.all_orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_other_users_cart_untouched() {
        let store = store_with_cart();
        fill_cart(&store, 1).await;
        fill_cart(&store, 2).await;

        coordinator(&store)
            .checkout(&Principal::customer(UserId(1)))
            .await
            .unwrap();
        assert_eq!(store.lines(UserId(2)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_product_aborts_without_writes() {
        let store = store_with_cart();
        fill_cart(&store, 1).await;
        store.remove_product(ProductId(2));

        let err = coordinator(&store)
            .checkout(&Principal::customer(UserId(1)))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ShopError::Pricing { product_id: ProductId(2), .. }
        ));
        assert!(store.all_orders().await.is_empty());
        assert_eq!(store.lines(UserId(1)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_order_insert_failure_keeps_cart() {
        let store = store_with_cart();
        fill_cart(&store, 1).await;
        store.inject(Fault::CreateOrder);

        let err = coordinator(&store)
            .checkout(&Principal::customer(UserId(1)))
            .await
            .unwrap_err();

        assert!(matches!(err, ShopError::Persistence(_)));
        assert!(store.all_orders().await.is_empty());
        assert_eq!(store.lines(UserId(1)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_clear_failure_rolls_order_back() {
        let store = store_with_cart();
        fill_cart(&store, 1).await;
        store.inject(Fault::ClearCart);

        let err = coordinator(&store)
            .checkout(&Principal::customer(UserId(1)))
            .await
            .unwrap_err();

        assert!(matches!(err, ShopError::Persistence(_)));
        assert!(store.all_orders().await.is_empty());
        assert_eq!(store.lines(UserId(1)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_clear_and_rollback_failure_is_residual() {
        let store = store_with_cart();
        fill_cart(&store, 1).await;
        store.inject(Fault::ClearCart);
        store.inject(Fault::Rollback);

        let err = coordinator(&store)
            .checkout(&Principal::customer(UserId(1)))
            .await
            .unwrap_err();

        match err {
            ShopError::ResidualInconsistency { order_id, .. } => assert_eq!(order_id, OrderId(1)),
            other => panic!("expected residual inconsistency, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_commit_failure_writes_nothing() {
        let store = store_with_cart();
        fill_cart(&store, 1).await;
        store.inject(Fault::Commit);

        let err = coordinator(&store)
            .checkout(&Principal::customer(UserId(1)))
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert!(store.all_orders().await.is_empty());
        assert_eq!(store.lines(UserId(1)).await.unwrap().len(), 2);
    }

    /// Memory checkout whose catalog lookups never answer
    struct StalledPricing(Arc<MemoryStore>);

    struct StalledUnit(Box<dyn CheckoutUnit>);

    #[async_trait]
    impl CheckoutStore for StalledPricing {
        async fn begin_checkout(&self, user_id: UserId) -> ShopResult<Box<dyn CheckoutUnit>> {
            Ok(Box::new(StalledUnit(self.0.begin_checkout(user_id).await?)))
        }
    }

    #[async_trait]
    impl CheckoutUnit for StalledUnit {
        fn cart_snapshot(&mut self) -> BoxStream<'_, ShopResult<CartLine>> {
            self.0.cart_snapshot()
        }

        async fn price(&mut self, _product_id: ProductId) -> ShopResult<Price> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Price::new(1.0, Currency::USD))
        }

        async fn create_order(&mut self, order: NewOrder) -> ShopResult<Order> {
            self.0.create_order(order).await
        }

        async fn clear_cart(&mut self) -> ShopResult<u64> {
            self.0.clear_cart().await
        }

        async fn commit(self: Box<Self>) -> ShopResult<()> {
            self.0.commit().await
        }

        async fn rollback(self: Box<Self>) -> ShopResult<()> {
            self.0.rollback().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pricing_timeout_aborts_checkout() {
        let store = store_with_cart();
        fill_cart(&store, 1).await;

        let coordinator =
            CheckoutCoordinator::new(Arc::new(StalledPricing(store.clone())), Currency::USD)
                .with_pricing_timeout(Duration::from_millis(50));
        let err = coordinator
            .checkout(&Principal::customer(UserId(1)))
            .await
            .unwrap_err();

        match err {
            ShopError::Pricing { source, .. } => {
                assert!(matches!(*source, ShopError::Timeout { .. }))
            }
            other => panic!("expected pricing timeout, got {other:?}"),
        }
        assert!(store.all_orders().await.is_empty());
        assert_eq!(store.lines(UserId(1)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_currency_mismatch_is_pricing_error() {
        let store = store_with_cart();
        store.set_price(ProductId(1), Price::new(10.0, Currency::EUR));
        fill_cart(&store, 1).await;

        let err = coordinator(&store)
            .checkout(&Principal::customer(UserId(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::Pricing { .. }));
    }
}
