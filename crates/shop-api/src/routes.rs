//! # Routes
//!
//! Axum router configuration for the storefront API.

use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the main application router
///
/// Routes:
/// - Orders:
///   - POST   /api/order - Check out the caller's cart
///   - GET    /api/orders - List the caller's orders
///   - GET    /api/orders/{id} - Get one order
///   - DELETE /api/orders/{id}/cancel - Cancel an order
///   - GET    /api/orders/{id}/payments - Payment attempts for an order
///   - PUT    /api/admin/orders/{id}/status - Set status (admin)
///
/// - Cart:
///   - POST   /api/cart - Add a product
///   - GET    /api/cart - View the cart
///   - DELETE /api/cart/{product_id} - Remove a product
///
/// - Payments:
///   - POST /api/create-payment-intent - Start a provider payment
///   - POST /api/webhook - Provider status notifications
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let order_routes = Router::new()
        .route("/order", post(handlers::place_order))
        .route("/orders", get(handlers::list_orders))
        .route("/orders/{id}", get(handlers::get_order))
        .route("/orders/{id}/cancel", delete(handlers::cancel_order))
        .route("/orders/{id}/payments", get(handlers::order_payments))
        .route("/admin/orders/{id}/status", put(handlers::admin_set_status));

    let cart_routes = Router::new()
        .route("/cart", post(handlers::add_to_cart).get(handlers::view_cart))
        .route("/cart/{product_id}", delete(handlers::remove_from_cart));

    // The webhook reads the raw body for signature checks
    let payment_routes = Router::new()
        .route("/create-payment-intent", post(handlers::create_payment_intent))
        .route("/webhook", post(handlers::payment_webhook));

    let api_routes = Router::new()
        .merge(order_routes)
        .merge(cart_routes)
        .merge(payment_routes);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/", get(handlers::health))
        .nest("/api", api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
