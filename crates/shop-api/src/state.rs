//! # Application State
//!
//! Shared state for the Axum application: the core services wired to one
//! storage backend, the payment provider, and request authentication.

use crate::auth::{IdentityProvider, TokenAuthority};
use crate::config::{AppConfig, StoreKind};
use shop_core::{
    BoxedPaymentProvider, CartService, CartStore, CheckoutCoordinator, CheckoutStore, Currency,
    MemoryStore, OrderLedger, OrderStore, PaymentReconciler, PaymentStore, PricingResolver,
    ShopResult,
};
use shop_store::{PgStore, PgStoreConfig};
use shop_stripe::{StripeIntentProvider, WebhookVerifier, HANDLED_EVENTS};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// A backend that serves every storage port
pub trait Storefront:
    CheckoutStore + PricingResolver + OrderStore + PaymentStore + CartStore + 'static
{
}

impl<T> Storefront for T where
    T: CheckoutStore + PricingResolver + OrderStore + PaymentStore + CartStore + 'static
{
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub checkout: Arc<CheckoutCoordinator>,
    pub ledger: Arc<OrderLedger>,
    pub reconciler: Arc<PaymentReconciler>,
    pub cart: Arc<CartService>,
    pub identity: Arc<dyn IdentityProvider>,
    pub webhooks: Arc<WebhookVerifier>,
}

/// Wiring options that do not depend on the backend
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub pricing: Duration,
    pub provider: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            pricing: shop_core::DEFAULT_PRICING_TIMEOUT,
            provider: shop_core::DEFAULT_PROVIDER_TIMEOUT,
        }
    }
}

impl AppState {
    /// Build the state for a running server from its configuration.
    ///
    /// Connects to (and migrates) Postgres unless `STORE=memory`.
    pub async fn from_config(config: &AppConfig) -> ShopResult<Self> {
        let provider: BoxedPaymentProvider =
            Arc::new(StripeIntentProvider::new(config.stripe.clone())?);
        let identity: Arc<dyn IdentityProvider> =
            Arc::new(TokenAuthority::new(&config.auth_secret));
        let webhooks = WebhookVerifier::new(config.stripe.webhook_secret.clone());
        if webhooks.requires_signature() {
            info!("Verifying Stripe webhooks for {}", HANDLED_EVENTS.join(", "));
        } else {
            warn!("STRIPE_WEBHOOK_SECRET not set; webhook requests are not authenticated");
        }
        let timeouts = Timeouts {
            pricing: config.pricing_timeout,
            provider: config.provider_timeout,
        };

        match config.store {
            StoreKind::Postgres => {
                let url = config.database_url.as_deref().unwrap_or_default();
                let pool_config = PgStoreConfig {
                    max_connections: config.db_max_connections,
                    ..PgStoreConfig::default()
                };
                let store = PgStore::connect(url, pool_config, config.currency).await?;
                store.migrate().await?;
                store.ping().await?;
                info!("Using Postgres store");
                Ok(Self::assemble(
                    Arc::new(store),
                    config.currency,
                    provider,
                    identity,
                    webhooks,
                    timeouts,
                ))
            }
            StoreKind::Memory => {
                warn!("Using in-memory store; data is lost on restart");
                Ok(Self::assemble(
                    Arc::new(MemoryStore::new()),
                    config.currency,
                    provider,
                    identity,
                    webhooks,
                    timeouts,
                ))
            }
        }
    }

    /// Wire the core services onto one backend
    pub fn assemble<S: Storefront>(
        store: Arc<S>,
        currency: Currency,
        provider: BoxedPaymentProvider,
        identity: Arc<dyn IdentityProvider>,
        webhooks: WebhookVerifier,
        timeouts: Timeouts,
    ) -> Self {
        let checkout = CheckoutCoordinator::new(store.clone(), currency)
            .with_pricing_timeout(timeouts.pricing);
        let reconciler = PaymentReconciler::new(store.clone(), store.clone(), provider)
            .with_provider_timeout(timeouts.provider);

        Self {
            checkout: Arc::new(checkout),
            ledger: Arc::new(OrderLedger::new(store.clone())),
            reconciler: Arc::new(reconciler),
            cart: Arc::new(CartService::new(store.clone(), store)),
            identity,
            webhooks: Arc::new(webhooks),
        }
    }
}
