//! Cart maintenance for the authenticated caller.

use crate::error::{ShopError, ShopResult};
use crate::ids::ProductId;
use crate::order::CartLine;
use crate::ports::{CartStore, PricingResolver};
use crate::principal::Principal;
use std::sync::Arc;
use tracing::debug;

pub struct CartService {
    store: Arc<dyn CartStore>,
    pricing: Arc<dyn PricingResolver>,
}

impl CartService {
    pub fn new(store: Arc<dyn CartStore>, pricing: Arc<dyn PricingResolver>) -> Self {
        Self { store, pricing }
    }

    /// Add `quantity` of a catalog product, merging with an existing line
    pub async fn add(
        &self,
        principal: &Principal,
        product_id: ProductId,
        quantity: u32,
    ) -> ShopResult<CartLine> {
        if quantity == 0 {
            return Err(ShopError::InvalidInput(
                "quantity must be at least 1".to_string(),
            ));
        }
        // Unknown products are rejected here rather than at checkout
        self.pricing.price(product_id).await?;

        let line = self
            .store
            .add_line(principal.user_id(), product_id, quantity)
            .await?;
        debug!(
            "Cart of user {} now holds product {} x{}",
            principal.user_id(),
            product_id,
            line.quantity
        );
        Ok(line)
    }

    pub async fn view(&self, principal: &Principal) -> ShopResult<Vec<CartLine>> {
        self.store.lines(principal.user_id()).await
    }

    pub async fn remove(&self, principal: &Principal, product_id: ProductId) -> ShopResult<()> {
        self.store
            .remove_line(principal.user_id(), product_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::UserId;
    use crate::memory::MemoryStore;
    use crate::money::{Currency, Price};

    fn service() -> (Arc<MemoryStore>, CartService) {
        let store = Arc::new(MemoryStore::default());
        store.set_price(ProductId(7), Price::new(3.0, Currency::USD));
        let cart = CartService::new(store.clone(), store.clone());
        (store, cart)
    }

    #[tokio::test]
    async fn test_add_merges_quantities() {
        let (_, cart) = service();
        let user = Principal::customer(UserId(1));
        cart.add(&user, ProductId(7), 1).await.unwrap();
        let line = cart.add(&user, ProductId(7), 4).await.unwrap();
        assert_eq!(line.quantity, 5);
        assert_eq!(cart.view(&user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_add_rejects_zero_and_unknown_products() {
        let (_, cart) = service();
        let user = Principal::customer(UserId(1));
        assert!(matches!(
            cart.add(&user, ProductId(7), 0).await.unwrap_err(),
            ShopError::InvalidInput(_)
        ));
        assert!(matches!(
            cart.add(&user, ProductId(8), 1).await.unwrap_err(),
            ShopError::NotFound { .. }
        ));
        assert!(cart.view(&user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_only_touches_callers_cart() {
        let (_, cart) = service();
        let alice = Principal::customer(UserId(1));
        let bob = Principal::customer(UserId(2));
        cart.add(&alice, ProductId(7), 1).await.unwrap();
        cart.add(&bob, ProductId(7), 1).await.unwrap();

        cart.remove(&alice, ProductId(7)).await.unwrap();
        assert!(cart.view(&alice).await.unwrap().is_empty());
        assert_eq!(cart.view(&bob).await.unwrap().len(), 1);

        let err = cart.remove(&alice, ProductId(7)).await.unwrap_err();
        assert!(matches!(err, ShopError::NotFound { .. }));
    }
}
