//! # Shop Error Types
//!
//! Typed error handling for the order and payment core.
//! All core operations return `Result<T, ShopError>`.

use crate::ids::{OrderId, ProductId};
use crate::order::OrderStatus;
use std::time::Duration;
use thiserror::Error;

/// Core error type for checkout, order and payment operations
#[derive(Debug, Error)]
pub enum ShopError {
    /// Missing order, payment or product (or one owned by someone else)
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// No usable credentials on the request
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated, but the role is insufficient
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Malformed body or unrecognized value
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Checkout requested with nothing in the cart
    #[error("Cart is empty")]
    EmptyCart,

    /// Status change not allowed from the current status
    #[error("Order cannot move from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// A cart line could not be priced; nothing was written
    #[error("Could not price product {product_id}: {source}")]
    Pricing {
        product_id: ProductId,
        #[source]
        source: Box<ShopError>,
    },

    /// Storage failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Payment provider API error
    #[error("Provider error [{provider}]: {message}")]
    PaymentProvider { provider: String, message: String },

    /// An outbound call did not finish in time
    #[error("Timed out after {after:?} waiting for {operation}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// The order was committed but the cart it came from could not be cleared
    #[error("Order {order_id} was created but the cart could not be cleared: {reason}")]
    ResidualInconsistency { order_id: OrderId, reason: String },

    /// Configuration errors (missing keys, invalid config)
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ShopError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        ShopError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn persistence(err: impl std::fmt::Display) -> Self {
        ShopError::Persistence(err.to_string())
    }

    /// Returns true if the caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        match self {
            ShopError::Persistence(_)
            | ShopError::PaymentProvider { .. }
            | ShopError::Timeout { .. } => true,
            ShopError::Pricing { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Returns the HTTP status code appropriate for this error
    pub fn status_code(&self) -> u16 {
        match self {
            ShopError::NotFound { .. } => 404,
            ShopError::Unauthorized(_) => 401,
            ShopError::Forbidden(_) => 403,
            ShopError::InvalidInput(_) => 400,
            ShopError::EmptyCart => 400,
            ShopError::InvalidTransition { .. } => 400,
            ShopError::Pricing { source, .. } => match source.as_ref() {
                ShopError::Timeout { .. } => 504,
                ShopError::NotFound { .. } => 409,
                _ => 500,
            },
            ShopError::Persistence(_) => 500,
            ShopError::PaymentProvider { .. } => 502,
            ShopError::Timeout { .. } => 504,
            ShopError::ResidualInconsistency { .. } => 500,
            ShopError::Configuration(_) => 500,
        }
    }

    /// Short message safe to show a caller. Storage and provider detail stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            ShopError::Persistence(_) | ShopError::Configuration(_) => {
                "Internal server error".to_string()
            }
            ShopError::PaymentProvider { .. } => "Payment provider unavailable".to_string(),
            ShopError::Timeout { operation, .. } => format!("Timed out waiting for {operation}"),
            ShopError::Pricing { product_id, source } => match source.as_ref() {
                ShopError::NotFound { .. } => {
                    format!("Product {product_id} in the cart is no longer available")
                }
                _ => format!("Could not price product {product_id}"),
            },
            ShopError::ResidualInconsistency { order_id, .. } => {
                format!("Order {order_id} was placed but the cart could not be cleared")
            }
            other => other.to_string(),
        }
    }

    /// Stable machine-readable kind, used in error bodies and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            ShopError::NotFound { .. } => "NotFound",
            ShopError::Unauthorized(_) => "Unauthorized",
            ShopError::Forbidden(_) => "Forbidden",
            ShopError::InvalidInput(_) => "InvalidInput",
            ShopError::EmptyCart => "EmptyCart",
            ShopError::InvalidTransition { .. } => "InvalidTransition",
            ShopError::Pricing { .. } => "PricingError",
            ShopError::Persistence(_) => "PersistenceError",
            ShopError::PaymentProvider { .. } => "PaymentProviderError",
            ShopError::Timeout { .. } => "Timeout",
            ShopError::ResidualInconsistency { .. } => "ResidualInconsistency",
            ShopError::Configuration(_) => "Configuration",
        }
    }
}

/// Result type alias for core operations
pub type ShopResult<T> = Result<T, ShopError>;
