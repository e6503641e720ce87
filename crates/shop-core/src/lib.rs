//! # shop-core
//!
//! Order lifecycle and payment coordination for the storefront.
//!
//! This crate provides:
//! - `CheckoutCoordinator` turning a cart into a priced order atomically
//! - `OrderLedger` for owner-scoped order lookups and status changes
//! - `PaymentReconciler` for provider intents and status notifications
//! - `CartService` for cart maintenance
//! - storage and provider ports, with an in-memory implementation
//! - `ShopError` for typed error handling
//!
//! ## Example
//!
//! ```rust,ignore
//! use shop_core::{CheckoutCoordinator, MemoryStore, Principal, UserId, Currency};
//!
//! let store = Arc::new(MemoryStore::default());
//! let checkout = CheckoutCoordinator::new(store.clone(), Currency::USD);
//!
//! // Turns the caller's cart into a `Not Paid` order and empties the cart
//! let order = checkout.checkout(&Principal::customer(UserId(1))).await?;
//! ```

pub mod cart;
pub mod checkout;
pub mod error;
pub mod ids;
pub mod ledger;
pub mod memory;
pub mod money;
pub mod order;
pub mod payment;
pub mod ports;
pub mod principal;
pub mod reconciler;

// Re-exports for convenience
pub use cart::CartService;
pub use checkout::{CheckoutCoordinator, DEFAULT_PRICING_TIMEOUT};
pub use error::{ShopError, ShopResult};
pub use ids::{OrderId, PaymentId, ProductId, UserId};
pub use ledger::OrderLedger;
pub use memory::{Fault, MemoryStore, RecordingProvider};
pub use money::{Currency, Price};
pub use order::{CartLine, NewOrder, Order, OrderStatus, Transition};
pub use payment::{
    IntentRequest, NewPayment, PaymentIntent, PaymentNotification, PaymentRecord, PaymentStatus,
    ReconcilePlan, Reconciliation,
};
pub use ports::{
    BoxedPaymentProvider, CartStore, CheckoutStore, CheckoutUnit, OrderStore, PaymentProvider,
    PaymentStore, PricingResolver,
};
pub use principal::{AdminPrincipal, Principal, Role};
pub use reconciler::{ClientHandshake, PaymentReconciler, DEFAULT_PROVIDER_TIMEOUT};
