//! # shop-api
//!
//! HTTP API layer for the storefront.
//!
//! This crate provides:
//! - Axum-based HTTP server
//! - Bearer token authentication
//! - REST endpoints for carts, orders and payments
//! - The payment provider webhook
//!
//! ## Endpoints
//!
//! | Method | Path | Auth | Description |
//! |--------|------|------|-------------|
//! | GET | `/health` | none | Health check |
//! | POST | `/api/order` | user | Check out the cart |
//! | GET | `/api/orders` | user | List orders |
//! | GET | `/api/orders/{id}` | user | Get order |
//! | DELETE | `/api/orders/{id}/cancel` | user | Cancel order |
//! | GET | `/api/orders/{id}/payments` | user | Payment attempts |
//! | PUT | `/api/admin/orders/{id}/status` | admin | Set order status |
//! | POST | `/api/create-payment-intent` | user | Start a payment |
//! | POST | `/api/webhook` | provider | Payment notification |
//! | POST | `/api/cart` | user | Add to cart |
//! | GET | `/api/cart` | user | View cart |
//! | DELETE | `/api/cart/{product_id}` | user | Remove from cart |

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use auth::{IdentityProvider, TokenAuthority};
pub use config::AppConfig;
pub use routes::create_router;
pub use state::AppState;
