use crate::domain::order::{Order, OrderStatus};
use crate::domain::ports::NotificationSink;
use crate::error::Result;
use async_trait::async_trait;
use tracing::info;

/// Notification sink that records status-change dispatches in the log.
/// Message rendering and delivery (email/SMS) are external collaborators;
/// deployments wire their own sink implementation in their place.
#[derive(Default, Clone)]
pub struct TracingNotifier;

impl TracingNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationSink for TracingNotifier {
    async fn send_order_status_update(
        &self,
        order: &Order,
        email: Option<&str>,
        phone: Option<&str>,
        old_status: OrderStatus,
    ) -> Result<()> {
        info!(
            order_id = %order.id,
            from = %old_status,
            to = %order.status,
            email = email.unwrap_or("-"),
            phone = phone.unwrap_or("-"),
            "order status notification dispatched"
        );
        Ok(())
    }
}
