//! # Order Types
//!
//! Orders, their status lifecycle, and the cart lines they are priced from.

use crate::error::{ShopError, ShopResult};
use crate::ids::{OrderId, ProductId, UserId};
use crate::money::Price;
use crate::payment::PaymentStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A per-user, per-product pending purchase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub user_id: UserId,
    pub product_id: ProductId,
    /// Always positive; the store rejects anything else
    pub quantity: u32,
    pub created_at: DateTime<Utc>,
}

/// Order status. The wire names are the ones the ledger stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    #[default]
    #[serde(rename = "Not Paid")]
    NotPaid,
    Paid,
    Pending,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::NotPaid,
        OrderStatus::Paid,
        OrderStatus::Pending,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::NotPaid => "Not Paid",
            OrderStatus::Paid => "Paid",
            OrderStatus::Pending => "Pending",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
        }
    }

    /// Whether a payment may still be started for an order in this status
    pub fn awaits_payment(&self) -> bool {
        matches!(self, OrderStatus::NotPaid | OrderStatus::Pending)
    }

    /// Order status implied by a payment status change, if any.
    ///
    /// Success settles an unpaid order; a processing payment parks it in
    /// `Pending`; a failed or cancelled payment releases `Pending` back to
    /// `NotPaid`. Fulfilment and cancellation are never overridden.
    pub fn after_payment(&self, payment: PaymentStatus) -> Option<OrderStatus> {
        match (self, payment) {
            (OrderStatus::NotPaid | OrderStatus::Pending, PaymentStatus::Succeeded) => {
                Some(OrderStatus::Paid)
            }
            (OrderStatus::NotPaid, PaymentStatus::Processing) => Some(OrderStatus::Pending),
            (OrderStatus::Pending, PaymentStatus::Failed | PaymentStatus::Cancelled) => {
                Some(OrderStatus::NotPaid)
            }
            _ => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ShopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ShopError::InvalidInput(format!("invalid order status: {s}")))
    }
}

/// A requested status change and the statuses it may not start from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub target: OrderStatus,
    pub rejected_from: &'static [OrderStatus],
}

impl Transition {
    /// User-triggered cancellation; refused once the order has shipped
    pub fn cancel() -> Self {
        Self {
            target: OrderStatus::Cancelled,
            rejected_from: &[OrderStatus::Shipped, OrderStatus::Delivered],
        }
    }

    /// Unconstrained admin status set
    pub fn to(target: OrderStatus) -> Self {
        Self {
            target,
            rejected_from: &[],
        }
    }

    /// Check the change against the status read under the row lock
    pub fn check(&self, current: OrderStatus) -> ShopResult<()> {
        if self.rejected_from.contains(&current) {
            return Err(ShopError::InvalidTransition {
                from: current,
                to: self.target,
            });
        }
        Ok(())
    }
}

/// An order as stored in the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    /// Computed once at checkout; the authoritative amount to charge
    pub total: Price,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

/// Values for a ledger insert. New orders always start `NotPaid`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub total: Price,
    pub status: OrderStatus,
}

impl NewOrder {
    pub fn new(user_id: UserId, total: Price) -> Self {
        Self {
            user_id,
            total,
            status: OrderStatus::NotPaid,
        }
    }
}
