use crate::domain::order::{Order, OrderStatus, TimelineEntry};
use crate::domain::payment::{PaymentAttempt, PaymentStatus};
use crate::domain::ports::{AttemptStore, OrderStore};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A thread-safe in-memory store for orders.
///
/// Uses `Arc<RwLock<HashMap<Uuid, Order>>>` to allow shared concurrent
/// access. The conditional status update runs entirely under one write
/// lock, which is what makes it atomic from the caller's perspective.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<Uuid, Order>>>,
}

impl InMemoryOrderStore {
    /// Creates a new, empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
        let orders = self.orders.read().await;
        Ok(orders.get(&id).cloned())
    }

    async fn insert_order(&self, order: Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        orders.insert(order.id, order);
        Ok(())
    }

    async fn update_order_status(
        &self,
        id: Uuid,
        expected: OrderStatus,
        entry: TimelineEntry,
    ) -> Result<Option<Order>> {
        let mut orders = self.orders.write().await;
        match orders.get_mut(&id) {
            Some(order) if order.status == expected => {
                order.record_status(entry);
                Ok(Some(order.clone()))
            }
            _ => Ok(None),
        }
    }
}

/// A thread-safe in-memory store for payment attempts, keyed by the
/// provider handle id.
#[derive(Default, Clone)]
pub struct InMemoryAttemptStore {
    attempts: Arc<RwLock<HashMap<String, PaymentAttempt>>>,
}

impl InMemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttemptStore for InMemoryAttemptStore {
    async fn record(&self, attempt: PaymentAttempt) -> Result<()> {
        let mut attempts = self.attempts.write().await;
        attempts.insert(attempt.handle_id.clone(), attempt);
        Ok(())
    }

    async fn get(&self, handle_id: &str) -> Result<Option<PaymentAttempt>> {
        let attempts = self.attempts.read().await;
        Ok(attempts.get(handle_id).cloned())
    }

    async fn active_for_order(&self, order_id: Uuid) -> Result<Option<PaymentAttempt>> {
        let attempts = self.attempts.read().await;
        Ok(attempts
            .values()
            .find(|attempt| attempt.order_id == order_id && attempt.is_active())
            .cloned())
    }

    async fn finalize(&self, handle_id: &str, status: PaymentStatus) -> Result<()> {
        let mut attempts = self.attempts.write().await;
        if let Some(attempt) = attempts.get_mut(handle_id) {
            attempt.status = status;
        }
        Ok(())
    }
}
