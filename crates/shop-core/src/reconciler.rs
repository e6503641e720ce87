//! # Payment Reconciler
//!
//! Starts provider charges for orders and applies the provider's
//! asynchronous status notifications.
//!
//! The provider call always completes before anything is written locally, so
//! a failed or timed-out call leaves no pending record behind. While an
//! order's latest record is still open, initiating again resends that
//! record's idempotency key, so the provider hands back the same intent.
//! Notifications are delivered at least once; applying the same one twice is
//! a no-op.

use crate::error::{ShopError, ShopResult};
use crate::ids::OrderId;
use crate::order::{Order, OrderStatus};
use crate::payment::{
    IntentRequest, NewPayment, PaymentIntent, PaymentNotification, PaymentRecord, Reconciliation,
};
use crate::ports::{OrderStore, PaymentProvider, PaymentStore};
use crate::principal::Principal;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Default bound on a provider call
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

/// What the client needs to confirm the charge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientHandshake {
    pub client_secret: String,
}

pub struct PaymentReconciler {
    orders: Arc<dyn OrderStore>,
    payments: Arc<dyn PaymentStore>,
    provider: Arc<dyn PaymentProvider>,
    provider_timeout: Duration,
}

impl PaymentReconciler {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        payments: Arc<dyn PaymentStore>,
        provider: Arc<dyn PaymentProvider>,
    ) -> Self {
        Self {
            orders,
            payments,
            provider,
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }

    /// Builder: set the provider call timeout
    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    /// Create a provider intent for one of the caller's orders and record it as pending.
    ///
    /// The charged amount is the order's stored total. Orders that are not
    /// awaiting payment are refused so a settled order is never charged twice.
    /// An open attempt is resumed rather than duplicated.
    #[instrument(skip(self, principal), fields(user_id = %principal.user_id(), provider = self.provider.provider_name()))]
    pub async fn initiate(
        &self,
        principal: &Principal,
        order_id: OrderId,
    ) -> ShopResult<ClientHandshake> {
        let order = self
            .orders
            .fetch_order(order_id, Some(principal.user_id()))
            .await?;
        if !order.status.awaits_payment() {
            return Err(ShopError::InvalidTransition {
                from: order.status,
                to: OrderStatus::Paid,
            });
        }

        let open = self
            .payments
            .payments_for_order(order.user_id, order.id)
            .await?
            .pop()
            .filter(|p| p.status.is_open() && p.idempotency_key.is_some());

        let request = IntentRequest {
            order_id: order.id,
            user_id: order.user_id,
            amount: order.total,
            idempotency_key: open
                .as_ref()
                .and_then(|p| p.idempotency_key.clone())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
        };
        let intent = self.create_intent(&request).await?;

        if let Some(existing) = open {
            if existing.transaction_id.as_deref() != Some(intent.intent_id.as_str()) {
                return Err(ShopError::PaymentProvider {
                    provider: self.provider.provider_name().to_string(),
                    message: format!(
                        "intent {} returned for the key of payment {}",
                        intent.intent_id, existing.id
                    ),
                });
            }
            info!(
                "Resuming payment {} for order {}: intent={}",
                existing.id, order.id, intent.intent_id
            );
            return Ok(ClientHandshake {
                client_secret: intent.client_secret,
            });
        }

        let record = self
            .payments
            .record_pending(pending_record(&order, &request, &intent))
            .await
            .map_err(|e| {
                error!(
                    "Intent {} created for order {} but the payment record failed: {}",
                    intent.intent_id, order.id, e
                );
                e
            })?;

        info!(
            "Payment {} pending for order {}: amount={}, intent={}",
            record.id,
            order.id,
            order.total.display(),
            intent.intent_id
        );
        Ok(ClientHandshake {
            client_secret: intent.client_secret,
        })
    }

    async fn create_intent(&self, request: &IntentRequest) -> ShopResult<PaymentIntent> {
        tokio::time::timeout(self.provider_timeout, self.provider.create_intent(request))
            .await
            .map_err(|_| ShopError::Timeout {
                operation: "payment provider",
                after: self.provider_timeout,
            })?
            .map_err(|e| {
                error!("Failed to create payment intent: {}", e);
                e
            })
    }

    /// Apply a provider notification to the payment record it names, or to
    /// the order's latest record when it names none.
    ///
    /// `NotFound` when no such payment exists for the order.
    #[instrument(skip(self), fields(order_id = %notification.order_id, status = %notification.status))]
    pub async fn reconcile(
        &self,
        notification: &PaymentNotification,
    ) -> ShopResult<Reconciliation> {
        let outcome = self.payments.reconcile(notification).await?;

        if !outcome.applied {
            info!(
                "Notification for order {} already applied (payment {} is {})",
                notification.order_id, outcome.payment.id, outcome.payment.status
            );
        } else if outcome.needs_refund() {
            warn!(
                "Payment {} succeeded for order {} which is {}; refund required",
                outcome.payment.id, notification.order_id, outcome.order_status
            );
        } else {
            info!(
                "Payment {} now {}, order {} is {}",
                outcome.payment.id,
                outcome.payment.status,
                notification.order_id,
                outcome.order_status
            );
        }
        Ok(outcome)
    }

    /// Payment attempts for one of the caller's orders
    pub async fn history(
        &self,
        principal: &Principal,
        order_id: OrderId,
    ) -> ShopResult<Vec<PaymentRecord>> {
        let order = self
            .orders
            .fetch_order(order_id, Some(principal.user_id()))
            .await?;
        self.payments
            .payments_for_order(principal.user_id(), order.id)
            .await
    }
}

fn pending_record(order: &Order, request: &IntentRequest, intent: &PaymentIntent) -> NewPayment {
    NewPayment {
        user_id: order.user_id,
        order_id: order.id,
        amount: order.total,
        transaction_id: Some(intent.intent_id.clone()),
        payment_method: intent.payment_method.clone(),
        idempotency_key: Some(request.idempotency_key.clone()),
    }
}
