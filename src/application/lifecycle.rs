use crate::domain::order::{Order, OrderStatus, TimelineEntry};
use crate::domain::ports::{SharedNotificationSink, SharedOrderStore};
use crate::error::{PaymentError, Result};
use tracing::{info, warn};
use uuid::Uuid;

/// Result of a transition request. `changed` is false when the order was
/// already at the target status (duplicate deliveries resolve here).
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub order: Order,
    pub previous: OrderStatus,
    pub changed: bool,
}

/// Validates and applies order status transitions.
///
/// Every status change in the system funnels through [`transition`]: the
/// admin status endpoint, the synchronous verify path and the webhook
/// ingress all converge here. The update is a compare-and-set against the
/// store (read current, guard, conditional write) so concurrent
/// confirmations for the same order advance it at most once.
///
/// [`transition`]: OrderLifecycle::transition
pub struct OrderLifecycle {
    orders: SharedOrderStore,
    notifier: SharedNotificationSink,
}

impl OrderLifecycle {
    pub fn new(orders: SharedOrderStore, notifier: SharedNotificationSink) -> Self {
        Self { orders, notifier }
    }

    /// Moves an order to `target`, appending the matching timeline entry.
    ///
    /// Guards: cancellation only from `pending`/`confirmed`; no transition
    /// out of a terminal state; forward skips are allowed. A request whose
    /// target equals the current status is a successful no-op so repeated
    /// deliveries never produce duplicate timeline entries.
    pub async fn transition(
        &self,
        order_id: Uuid,
        target: OrderStatus,
        note: Option<String>,
    ) -> Result<TransitionOutcome> {
        loop {
            let order = self
                .orders
                .get_order(order_id)
                .await?
                .ok_or(PaymentError::OrderNotFound(order_id))?;
            let current = order.status;

            if current == target {
                return Ok(TransitionOutcome {
                    order,
                    previous: current,
                    changed: false,
                });
            }
            if current.is_terminal() {
                return Err(PaymentError::InvalidTransition(format!(
                    "order {order_id} is {current}; no further transitions permitted"
                )));
            }
            if target == OrderStatus::Cancelled && !current.allows_cancellation() {
                return Err(PaymentError::InvalidTransition(format!(
                    "order {order_id} cannot be cancelled from {current}"
                )));
            }
            if target == OrderStatus::Pending {
                return Err(PaymentError::InvalidTransition(format!(
                    "order {order_id} cannot return to pending"
                )));
            }

            let entry = TimelineEntry::new(target, note.clone());
            // Conditional write; a concurrent writer invalidates our read
            // and we re-evaluate the guards against the fresh status.
            if let Some(updated) = self
                .orders
                .update_order_status(order_id, current, entry)
                .await?
            {
                info!(%order_id, from = %current, to = %target, "order status updated");
                return Ok(TransitionOutcome {
                    order: updated,
                    previous: current,
                    changed: true,
                });
            }
        }
    }

    /// Idempotent payment confirmation used by the webhook ingress and the
    /// verify path. Orders already confirmed (or further along, or
    /// terminal) are a no-op success: redelivered completion events get an
    /// ack and no duplicate timeline entry.
    pub async fn confirm_payment(
        &self,
        order_id: Uuid,
        note: Option<String>,
    ) -> Result<TransitionOutcome> {
        loop {
            let order = self
                .orders
                .get_order(order_id)
                .await?
                .ok_or(PaymentError::OrderNotFound(order_id))?;
            let current = order.status;

            if current.payment_confirmed() {
                info!(%order_id, status = %current, "payment confirmation replay ignored");
                return Ok(TransitionOutcome {
                    order,
                    previous: current,
                    changed: false,
                });
            }

            let entry = TimelineEntry::new(OrderStatus::Confirmed, note.clone());
            if let Some(updated) = self
                .orders
                .update_order_status(order_id, current, entry)
                .await?
            {
                info!(%order_id, "payment confirmed");
                return Ok(TransitionOutcome {
                    order: updated,
                    previous: current,
                    changed: true,
                });
            }
        }
    }

    /// Invoked by callers after a successful transition. Notification
    /// failures are logged and swallowed; they never roll back a status
    /// change and never surface to webhook providers.
    pub async fn notify(&self, outcome: &TransitionOutcome) {
        if !outcome.changed {
            return;
        }
        let order = &outcome.order;
        if let Err(err) = self
            .notifier
            .send_order_status_update(
                order,
                order.email.as_deref(),
                order.phone.as_deref(),
                outcome.previous,
            )
            .await
        {
            warn!(order_id = %order.id, %err, "status notification failed");
        }
    }
}
