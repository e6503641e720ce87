//! # In-memory Store
//!
//! A process-local implementation of every storage port plus a scripted
//! payment provider. Used by the test suites and by `STORE=memory` dev runs.
//!
//! Checkout units hold the table lock for their whole lifetime and work on a
//! copy of the tables, so commit and rollback behave like a database
//! transaction. Failures can be injected per step with [`Fault`].

use crate::error::{ShopError, ShopResult};
use crate::ids::{OrderId, PaymentId, ProductId, UserId};
use crate::money::Price;
use crate::order::{CartLine, NewOrder, Order, Transition};
use crate::payment::{
    IntentRequest, NewPayment, PaymentIntent, PaymentNotification, PaymentRecord, PaymentStatus,
    ReconcilePlan, Reconciliation,
};
use crate::ports::{
    CartStore, CheckoutStore, CheckoutUnit, OrderStore, PaymentProvider, PaymentStore,
    PricingResolver,
};
use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// A storage step that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    CreateOrder,
    ClearCart,
    Commit,
    Rollback,
    RecordPayment,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    orders: Vec<Order>,
    cart: Vec<CartLine>,
    payments: Vec<PaymentRecord>,
    next_order_id: i64,
    next_payment_id: i64,
}

impl Tables {
    fn insert_order(&mut self, new: NewOrder) -> Order {
        self.next_order_id += 1;
        let order = Order {
            id: OrderId(self.next_order_id),
            user_id: new.user_id,
            total: new.total,
            status: new.status,
            created_at: Utc::now(),
        };
        self.orders.push(order.clone());
        order
    }

    fn order_mut(&mut self, order_id: OrderId, owner: Option<UserId>) -> ShopResult<&mut Order> {
        self.orders
            .iter_mut()
            .find(|o| o.id == order_id && owner.map_or(true, |u| o.user_id == u))
            .ok_or_else(|| ShopError::not_found("order", order_id))
    }

    /// Index of the record a notification is about: the one carrying its
    /// transaction id, or the order's latest record when it names none
    fn payment_for(&self, notification: &PaymentNotification) -> ShopResult<usize> {
        let order_id = notification.order_id;
        let found = match notification.transaction_id.as_deref() {
            Some(tx) => self
                .payments
                .iter()
                .rposition(|p| p.order_id == order_id && p.transaction_id.as_deref() == Some(tx)),
            None => self.payments.iter().rposition(|p| p.order_id == order_id),
        };
        found.ok_or_else(|| ShopError::not_found("payment", order_id))
    }
}

type Faults = Arc<Mutex<HashSet<Fault>>>;

fn check_fault(faults: &Faults, fault: Fault) -> ShopResult<()> {
    if faults.lock().contains(&fault) {
        return Err(ShopError::Persistence(format!("injected failure: {fault:?}")));
    }
    Ok(())
}

type Catalog = Arc<RwLock<HashMap<ProductId, Price>>>;

fn catalog_price(catalog: &Catalog, product_id: ProductId) -> ShopResult<Price> {
    catalog
        .read()
        .get(&product_id)
        .copied()
        .ok_or_else(|| ShopError::not_found("product", product_id))
}

/// In-memory catalog, cart, order ledger and payment records
#[derive(Default)]
pub struct MemoryStore {
    tables: Arc<AsyncMutex<Tables>>,
    catalog: Catalog,
    faults: Faults,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or reprice a catalog product
    pub fn set_price(&self, product_id: ProductId, price: Price) {
        self.catalog.write().insert(product_id, price);
    }

    pub fn remove_product(&self, product_id: ProductId) {
        self.catalog.write().remove(&product_id);
    }

    pub fn inject(&self, fault: Fault) {
        self.faults.lock().insert(fault);
    }

    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    /// Every order, regardless of owner
    pub async fn all_orders(&self) -> Vec<Order> {
        self.tables.lock().await.orders.clone()
    }

    /// Every payment record, regardless of owner
    pub async fn all_payments(&self) -> Vec<PaymentRecord> {
        self.tables.lock().await.payments.clone()
    }
}

#[async_trait]
impl PricingResolver for MemoryStore {
    async fn price(&self, product_id: ProductId) -> ShopResult<Price> {
        catalog_price(&self.catalog, product_id)
    }
}

/// Checkout unit over a private copy of the tables
pub struct MemoryCheckoutUnit {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
    catalog: Catalog,
    user_id: UserId,
    faults: Faults,
}

#[async_trait]
impl CheckoutStore for MemoryStore {
    async fn begin_checkout(&self, user_id: UserId) -> ShopResult<Box<dyn CheckoutUnit>> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryCheckoutUnit {
            guard,
            working,
            catalog: self.catalog.clone(),
            user_id,
            faults: self.faults.clone(),
        }))
    }
}

#[async_trait]
impl CheckoutUnit for MemoryCheckoutUnit {
    fn cart_snapshot(&mut self) -> BoxStream<'_, ShopResult<CartLine>> {
        let user_id = self.user_id;
        let lines: Vec<_> = self
            .working
            .cart
            .iter()
            .filter(|line| line.user_id == user_id)
            .cloned()
            .map(Ok)
            .collect();
        stream::iter(lines).boxed()
    }

    async fn price(&mut self, product_id: ProductId) -> ShopResult<Price> {
        catalog_price(&self.catalog, product_id)
    }

    async fn create_order(&mut self, order: NewOrder) -> ShopResult<Order> {
        check_fault(&self.faults, Fault::CreateOrder)?;
        Ok(self.working.insert_order(order))
    }

    async fn clear_cart(&mut self) -> ShopResult<u64> {
        check_fault(&self.faults, Fault::ClearCart)?;
        let before = self.working.cart.len();
        let user_id = self.user_id;
        self.working.cart.retain(|line| line.user_id != user_id);
        Ok((before - self.working.cart.len()) as u64)
    }

    async fn commit(self: Box<Self>) -> ShopResult<()> {
        check_fault(&self.faults, Fault::Commit)?;
        let MemoryCheckoutUnit {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> ShopResult<()> {
        check_fault(&self.faults, Fault::Rollback)?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn fetch_order(&self, order_id: OrderId, owner: Option<UserId>) -> ShopResult<Order> {
        let mut tables = self.tables.lock().await;
        tables.order_mut(order_id, owner).map(|o| o.clone())
    }

    async fn list_orders(&self, user_id: UserId) -> ShopResult<Vec<Order>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .orders
            .iter()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn transition(
        &self,
        order_id: OrderId,
        owner: Option<UserId>,
        transition: Transition,
    ) -> ShopResult<Order> {
        let mut tables = self.tables.lock().await;
        let order = tables.order_mut(order_id, owner)?;
        transition.check(order.status)?;
        order.status = transition.target;
        Ok(order.clone())
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn record_pending(&self, payment: NewPayment) -> ShopResult<PaymentRecord> {
        check_fault(&self.faults, Fault::RecordPayment)?;
        let mut tables = self.tables.lock().await;
        tables.next_payment_id += 1;
        let record = PaymentRecord {
            id: PaymentId(tables.next_payment_id),
            user_id: payment.user_id,
            order_id: payment.order_id,
            amount: payment.amount,
            status: PaymentStatus::Pending,
            transaction_id: payment.transaction_id,
            payment_method: payment.payment_method,
            idempotency_key: payment.idempotency_key,
            created_at: Utc::now(),
        };
        tables.payments.push(record.clone());
        Ok(record)
    }

    async fn payments_for_order(
        &self,
        user_id: UserId,
        order_id: OrderId,
    ) -> ShopResult<Vec<PaymentRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .payments
            .iter()
            .filter(|p| p.order_id == order_id && p.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn reconcile(&self, notification: &PaymentNotification) -> ShopResult<Reconciliation> {
        let mut tables = self.tables.lock().await;
        let payment_idx = tables.payment_for(notification)?;
        let order_status = tables.order_mut(notification.order_id, None)?.status;

        let plan = ReconcilePlan::decide(
            tables.payments[payment_idx].status,
            order_status,
            notification.status,
        );

        if let Some(status) = plan.payment {
            tables.payments[payment_idx].status = status;
        }
        let order_status = match plan.order {
            Some(next) => {
                let order = tables.order_mut(notification.order_id, None)?;
                order.status = next;
                next
            }
            None => order_status,
        };

        Ok(Reconciliation::new(
            tables.payments[payment_idx].clone(),
            order_status,
            &plan,
        ))
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn add_line(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> ShopResult<CartLine> {
        let mut tables = self.tables.lock().await;
        if let Some(line) = tables
            .cart
            .iter_mut()
            .find(|l| l.user_id == user_id && l.product_id == product_id)
        {
            line.quantity = line
                .quantity
                .checked_add(quantity)
                .ok_or_else(|| ShopError::InvalidInput("quantity overflows".to_string()))?;
            return Ok(line.clone());
        }
        let line = CartLine {
            user_id,
            product_id,
            quantity,
            created_at: Utc::now(),
        };
        tables.cart.push(line.clone());
        Ok(line)
    }

    async fn lines(&self, user_id: UserId) -> ShopResult<Vec<CartLine>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .cart
            .iter()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn remove_line(&self, user_id: UserId, product_id: ProductId) -> ShopResult<()> {
        let mut tables = self.tables.lock().await;
        let before = tables.cart.len();
        tables
            .cart
            .retain(|l| !(l.user_id == user_id && l.product_id == product_id));
        if tables.cart.len() == before {
            return Err(ShopError::not_found("cart line", product_id));
        }
        Ok(())
    }
}

/// Payment provider that hands out fake intents and remembers every request.
///
/// A repeated idempotency key gets the intent first created for it back.
#[derive(Default)]
pub struct RecordingProvider {
    requests: Mutex<Vec<IntentRequest>>,
    intents: Mutex<HashMap<String, PaymentIntent>>,
    failure: Mutex<Option<String>>,
}

impl RecordingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following request fail with a provider error
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.lock() = Some(message.into());
    }

    pub fn requests(&self) -> Vec<IntentRequest> {
        self.requests.lock().clone()
    }

    /// Distinct intents handed out so far
    pub fn intents_created(&self) -> usize {
        self.intents.lock().len()
    }
}

#[async_trait]
impl PaymentProvider for RecordingProvider {
    async fn create_intent(&self, request: &IntentRequest) -> ShopResult<PaymentIntent> {
        if let Some(message) = self.failure.lock().clone() {
            return Err(ShopError::PaymentProvider {
                provider: self.provider_name().to_string(),
                message,
            });
        }
        self.requests.lock().push(request.clone());
        let mut intents = self.intents.lock();
        let n = intents.len() + 1;
        let intent = intents
            .entry(request.idempotency_key.clone())
            .or_insert_with(|| PaymentIntent {
                intent_id: format!("pi_mem_{n}"),
                client_secret: format!("pi_mem_{n}_secret_{}", request.order_id),
                payment_method: Some("card".to_string()),
            });
        Ok(intent.clone())
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}
