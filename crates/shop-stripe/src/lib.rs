//! # shop-stripe
//!
//! Stripe payment provider for the storefront.
//!
//! - **StripeIntentProvider** creates PaymentIntents for orders and hands
//!   back the `client_secret` the browser confirms the payment with
//! - **WebhookVerifier** checks `Stripe-Signature` headers and turns
//!   webhook bodies into payment status notifications
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use shop_stripe::{StripeConfig, StripeIntentProvider};
//!
//! // Create provider from environment
//! let provider = StripeIntentProvider::from_env()?;
//! let intent = provider.create_intent(&request).await?;
//!
//! // In your webhook endpoint:
//! let verifier = WebhookVerifier::new(config.webhook_secret.clone());
//! if let Some(notification) = verifier.parse_notification(&body, signature)? {
//!     reconciler.reconcile(&notification).await?;
//! }
//! ```

pub mod config;
pub mod intent;
pub mod webhook;

// Re-exports
pub use config::StripeConfig;
pub use intent::StripeIntentProvider;
pub use webhook::{compute_signature, WebhookVerifier, HANDLED_EVENTS};
