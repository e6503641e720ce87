//! # Request Handlers
//!
//! Axum request handlers for orders, carts and payments. Authentication is
//! resolved by the extractors in [`crate::auth`]; every handler here only
//! sees an already-authenticated principal.

use crate::auth::{Admin, Authenticated};
use crate::error::{ApiJson, ApiPath, ApiResult};
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use shop_core::{
    CartLine, ClientHandshake, Order, OrderId, OrderStatus, PaymentRecord, ProductId,
};
use tracing::{info, instrument};

// =============================================================================
// Request/Response Types
// =============================================================================

/// Admin status change
#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    /// One of the order status names, e.g. `"Shipped"` or `"Not Paid"`
    pub status: String,
}

/// Payment initiation
#[derive(Debug, Deserialize)]
pub struct PaymentIntentRequest {
    pub order_id: OrderId,
}

/// Add to cart
#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    pub product_id: ProductId,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

/// Webhook acknowledgement
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    /// False for duplicates, stale updates and ignored event types
    pub applied: bool,
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "storefront",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Turn the caller's cart into an order
#[instrument(skip(state, principal), fields(user_id = %principal.user_id()))]
pub async fn place_order(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
) -> ApiResult<(StatusCode, Json<Order>)> {
    let order = state.checkout.checkout(&principal).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn list_orders(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
) -> ApiResult<Json<Vec<Order>>> {
    Ok(Json(state.ledger.list(&principal).await?))
}

pub async fn get_order(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    ApiPath(order_id): ApiPath<OrderId>,
) -> ApiResult<Json<Order>> {
    Ok(Json(state.ledger.get(&principal, order_id).await?))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    ApiPath(order_id): ApiPath<OrderId>,
) -> ApiResult<Json<Order>> {
    Ok(Json(state.ledger.cancel(&principal, order_id).await?))
}

/// Set an order's status; names outside the closed set are a 400
#[instrument(skip(state, admin, request))]
pub async fn admin_set_status(
    State(state): State<AppState>,
    Admin(admin): Admin,
    ApiPath(order_id): ApiPath<OrderId>,
    ApiJson(request): ApiJson<SetStatusRequest>,
) -> ApiResult<Json<Order>> {
    let status: OrderStatus = request.status.parse()?;
    Ok(Json(state.ledger.set_status(&admin, order_id, status).await?))
}

/// Start a provider payment for one of the caller's orders
pub async fn create_payment_intent(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    ApiJson(request): ApiJson<PaymentIntentRequest>,
) -> ApiResult<Json<ClientHandshake>> {
    let handshake = state
        .reconciler
        .initiate(&principal, request.order_id)
        .await?;
    Ok(Json(handshake))
}

pub async fn order_payments(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    ApiPath(order_id): ApiPath<OrderId>,
) -> ApiResult<Json<Vec<PaymentRecord>>> {
    Ok(Json(state.reconciler.history(&principal, order_id).await?))
}

/// Payment status notifications from the provider
#[instrument(skip(state, headers, body))]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookAck>> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok());

    let Some(notification) = state.webhooks.parse_notification(&body, signature)? else {
        return Ok(Json(WebhookAck {
            received: true,
            applied: false,
        }));
    };

    info!(
        "Received payment notification: order={}, status={}",
        notification.order_id, notification.status
    );
    let outcome = state.reconciler.reconcile(&notification).await?;

    Ok(Json(WebhookAck {
        received: true,
        applied: outcome.applied,
    }))
}

pub async fn add_to_cart(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    ApiJson(request): ApiJson<AddToCartRequest>,
) -> ApiResult<(StatusCode, Json<CartLine>)> {
    let line = state
        .cart
        .add(&principal, request.product_id, request.quantity)
        .await?;
    Ok((StatusCode::CREATED, Json(line)))
}

pub async fn view_cart(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
) -> ApiResult<Json<Vec<CartLine>>> {
    Ok(Json(state.cart.view(&principal).await?))
}

pub async fn remove_from_cart(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    ApiPath(product_id): ApiPath<ProductId>,
) -> ApiResult<StatusCode> {
    state.cart.remove(&principal, product_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
