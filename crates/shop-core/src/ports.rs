//! # Ports
//!
//! Traits at the seams between the core and its collaborators. The store
//! implementations live in `shop-store` (Postgres) and [`crate::memory`];
//! the payment provider lives in `shop-stripe`.
//!
//! ```text
//! ┌──────────────────────┐     ┌──────────────────┐
//! │ CheckoutCoordinator  │────▶│ CheckoutStore    │──▶ CheckoutUnit
//! └──────────────────────┘     └──────────────────┘     ├── cart_snapshot()
//!                                                       ├── price()
//! ┌──────────────────────┐     ┌──────────────────┐     ├── create_order()
//! │ CartService          │────▶│ CartStore        │     ├── clear_cart()
//! │                      │────▶│ PricingResolver  │     └── commit() / rollback()
//! └──────────────────────┘     └──────────────────┘
//!
//! ┌──────────────────────┐     ┌──────────────────┐
//! │ PaymentReconciler    │────▶│ OrderStore       │
//! │                      │────▶│ PaymentStore     │
//! │                      │────▶│ PaymentProvider  │
//! └──────────────────────┘     └──────────────────┘
//! ```

use crate::error::ShopResult;
use crate::ids::{OrderId, ProductId, UserId};
use crate::money::Price;
use crate::order::{CartLine, NewOrder, Order, Transition};
use crate::payment::{
    IntentRequest, NewPayment, PaymentIntent, PaymentNotification, PaymentRecord, Reconciliation,
};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

/// Current authoritative unit price for a product.
///
/// Implementations must read catalog state at call time; callers bound the
/// call with a timeout.
#[async_trait]
pub trait PricingResolver: Send + Sync {
    /// `NotFound` if the product does not exist
    async fn price(&self, product_id: ProductId) -> ShopResult<Price>;
}

/// Starts the storage transaction a checkout runs inside
#[async_trait]
pub trait CheckoutStore: Send + Sync {
    async fn begin_checkout(&self, user_id: UserId) -> ShopResult<Box<dyn CheckoutUnit>>;
}

/// One checkout's unit of work.
///
/// Nothing written through the unit is visible to other callers until
/// [`CheckoutUnit::commit`] succeeds. Dropping the unit without committing
/// discards its writes.
#[async_trait]
pub trait CheckoutUnit: Send {
    /// The user's cart lines, read once and locked until the unit ends.
    ///
    /// An empty stream is an empty cart; a query failure arrives as an `Err` item.
    fn cart_snapshot(&mut self) -> BoxStream<'_, ShopResult<CartLine>>;

    /// Current catalog price, read inside the unit.
    ///
    /// Same contract as [`PricingResolver::price`]; the unit prices on the
    /// connection it already holds.
    async fn price(&mut self, product_id: ProductId) -> ShopResult<Price>;

    /// Ledger insert: assigns the id and creation timestamp
    async fn create_order(&mut self, order: NewOrder) -> ShopResult<Order>;

    /// Deletes every cart line of the unit's user, returning how many went
    async fn clear_cart(&mut self) -> ShopResult<u64>;

    async fn commit(self: Box<Self>) -> ShopResult<()>;

    async fn rollback(self: Box<Self>) -> ShopResult<()>;
}

/// Order ledger storage
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Fetch one order. With `owner` set, orders of other users are `NotFound`.
    async fn fetch_order(&self, order_id: OrderId, owner: Option<UserId>) -> ShopResult<Order>;

    /// All orders of a user in creation order; empty when there are none
    async fn list_orders(&self, user_id: UserId) -> ShopResult<Vec<Order>>;

    /// Compare-and-set status change.
    ///
    /// The current status is read under a row lock, checked against
    /// `transition`, and the new status written in the same transaction.
    async fn transition(
        &self,
        order_id: OrderId,
        owner: Option<UserId>,
        transition: Transition,
    ) -> ShopResult<Order>;
}

/// Payment record storage
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn record_pending(&self, payment: NewPayment) -> ShopResult<PaymentRecord>;

    /// Records for one of the user's orders, oldest first; empty when none
    async fn payments_for_order(
        &self,
        user_id: UserId,
        order_id: OrderId,
    ) -> ShopResult<Vec<PaymentRecord>>;

    /// Apply a notification, and the order status it implies, in one
    /// transaction.
    ///
    /// A notification carrying a transaction id applies to the order's record
    /// with that id; one without applies to the order's most recent record.
    /// A record's transaction id is never rewritten. `NotFound` when no
    /// record matches.
    async fn reconcile(&self, notification: &PaymentNotification) -> ShopResult<Reconciliation>;
}

/// Cart storage
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Insert a line, or add to the quantity of an existing one
    async fn add_line(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> ShopResult<CartLine>;

    async fn lines(&self, user_id: UserId) -> ShopResult<Vec<CartLine>>;

    /// `NotFound` if the product is not in the cart
    async fn remove_line(&self, user_id: UserId, product_id: ProductId) -> ShopResult<()>;
}

/// External payment provider
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a charge intent for the amount in the request
    async fn create_intent(&self, request: &IntentRequest) -> ShopResult<PaymentIntent>;

    /// Provider name (for logging)
    fn provider_name(&self) -> &'static str;
}

/// Type alias for a shared payment provider (dynamic dispatch)
pub type BoxedPaymentProvider = Arc<dyn PaymentProvider>;
