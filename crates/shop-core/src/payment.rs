//! # Payment Types
//!
//! Payment records, provider intents, and the notifications that reconcile them.

use crate::error::ShopError;
use crate::ids::{OrderId, PaymentId, UserId};
use crate::money::Price;
use crate::order::OrderStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of a payment record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Intent created, nothing heard from the provider yet
    #[default]
    Pending,
    Processing,
    Succeeded,
    Failed,
    #[serde(rename = "canceled", alias = "cancelled")]
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "canceled",
        }
    }

    /// Status to store when `incoming` is delivered on a record currently in `self`.
    ///
    /// `None` means the delivery changes nothing: a repeat of the current
    /// status, or a stale event arriving after the payment already settled.
    pub fn advance_to(&self, incoming: PaymentStatus) -> Option<PaymentStatus> {
        if *self == incoming || *self == PaymentStatus::Succeeded {
            return None;
        }
        Some(incoming)
    }

    /// The provider intent behind the record may still be confirmed
    pub fn is_open(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Processing)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ShopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(PaymentStatus::Pending),
            "processing" => Ok(PaymentStatus::Processing),
            "succeeded" => Ok(PaymentStatus::Succeeded),
            "failed" => Ok(PaymentStatus::Failed),
            "canceled" | "cancelled" => Ok(PaymentStatus::Cancelled),
            other => Err(ShopError::InvalidInput(format!(
                "invalid payment status: {other}"
            ))),
        }
    }
}

/// A local record of one payment attempt for an order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: PaymentId,
    pub user_id: UserId,
    pub order_id: OrderId,
    pub amount: Price,
    pub status: PaymentStatus,
    /// Provider-side identifier (Stripe payment intent id)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    /// Idempotency key sent with the provider request
    #[serde(skip_serializing)]
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Values for a payment record insert. Records always start `pending`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    pub user_id: UserId,
    pub order_id: OrderId,
    pub amount: Price,
    pub transaction_id: Option<String>,
    pub payment_method: Option<String>,
    pub idempotency_key: Option<String>,
}

/// What the provider is asked to charge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentRequest {
    pub order_id: OrderId,
    pub user_id: UserId,
    /// Amount in minor units, taken from the order's stored total
    pub amount: Price,
    pub idempotency_key: String,
}

/// Provider handshake object for an in-progress charge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    /// Provider's intent id
    pub intent_id: String,
    /// Token the client uses to confirm the charge
    pub client_secret: String,
    pub payment_method: Option<String>,
}

/// An asynchronous, possibly repeated, status update from the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentNotification {
    pub order_id: OrderId,
    pub status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
}

impl PaymentNotification {
    pub fn new(order_id: OrderId, status: PaymentStatus) -> Self {
        Self {
            order_id,
            status,
            transaction_id: None,
        }
    }
}

/// Changes a notification calls for, decided from the locked current state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub payment: Option<PaymentStatus>,
    pub order: Option<OrderStatus>,
    /// The record settles on an order that no longer awaits payment:
    /// cancelled, or already paid through another record.
    pub refund: bool,
}

impl ReconcilePlan {
    pub fn decide(
        payment: PaymentStatus,
        order: OrderStatus,
        incoming: PaymentStatus,
    ) -> Self {
        let next_payment = payment.advance_to(incoming);
        let next_order = next_payment.and_then(|status| order.after_payment(status));
        Self {
            payment: next_payment,
            order: next_order,
            refund: next_payment == Some(PaymentStatus::Succeeded) && !order.awaits_payment(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.payment.is_none() && self.order.is_none()
    }
}

/// Outcome of applying one notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub payment: PaymentRecord,
    pub order_status: OrderStatus,
    /// False when the notification was a duplicate or stale
    pub applied: bool,
    refund_due: bool,
}

impl Reconciliation {
    /// Outcome of `plan` once applied; `payment` and `order_status` are the stored values
    pub fn new(payment: PaymentRecord, order_status: OrderStatus, plan: &ReconcilePlan) -> Self {
        Self {
            payment,
            order_status,
            applied: !plan.is_noop(),
            refund_due: plan.refund,
        }
    }

    /// Money was captured that the order cannot use: it was cancelled in the
    /// meantime, or another payment record already paid it
    pub fn needs_refund(&self) -> bool {
        self.refund_due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status() {
        assert_eq!("succeeded".parse::<PaymentStatus>().unwrap(), PaymentStatus::Succeeded);
        assert_eq!("Cancelled".parse::<PaymentStatus>().unwrap(), PaymentStatus::Cancelled);
        assert!("refunded".parse::<PaymentStatus>().is_err());
    }

    #[test]
    fn test_repeat_delivery_is_noop() {
        let plan = ReconcilePlan::decide(
            PaymentStatus::Succeeded,
            OrderStatus::Paid,
            PaymentStatus::Succeeded,
        );
        assert!(plan.is_noop());
    }

    #[test]
    fn test_success_never_regresses() {
        assert_eq!(PaymentStatus::Succeeded.advance_to(PaymentStatus::Processing), None);
        assert_eq!(PaymentStatus::Succeeded.advance_to(PaymentStatus::Failed), None);
        assert_eq!(
            PaymentStatus::Failed.advance_to(PaymentStatus::Succeeded),
            Some(PaymentStatus::Succeeded)
        );
    }

    #[test]
    fn test_success_pays_order() {
        let plan = ReconcilePlan::decide(
            PaymentStatus::Pending,
            OrderStatus::NotPaid,
            PaymentStatus::Succeeded,
        );
        assert_eq!(plan.payment, Some(PaymentStatus::Succeeded));
        assert_eq!(plan.order, Some(OrderStatus::Paid));
    }

    #[test]
    fn test_cancelled_order_stays_cancelled() {
        let plan = ReconcilePlan::decide(
            PaymentStatus::Pending,
            OrderStatus::Cancelled,
            PaymentStatus::Succeeded,
        );
        assert_eq!(plan.payment, Some(PaymentStatus::Succeeded));
        assert_eq!(plan.order, None);
        assert!(plan.refund);
    }

    #[test]
    fn test_second_success_on_paid_order_is_refunded() {
        let plan = ReconcilePlan::decide(
            PaymentStatus::Pending,
            OrderStatus::Paid,
            PaymentStatus::Succeeded,
        );
        assert_eq!(plan.payment, Some(PaymentStatus::Succeeded));
        assert_eq!(plan.order, None);
        assert!(plan.refund);
        assert!(!plan.is_noop());
    }

    #[test]
    fn test_first_success_is_not_refunded() {
        let plan = ReconcilePlan::decide(
            PaymentStatus::Processing,
            OrderStatus::Pending,
            PaymentStatus::Succeeded,
        );
        assert_eq!(plan.order, Some(OrderStatus::Paid));
        assert!(!plan.refund);
    }

    #[test]
    fn test_notification_body() {
        let n: PaymentNotification =
            serde_json::from_str(r#"{"order_id": 9, "status": "succeeded"}"#).unwrap();
        assert_eq!(n, PaymentNotification::new(OrderId(9), PaymentStatus::Succeeded));
    }
}
