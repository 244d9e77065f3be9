use crate::error::PaymentError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Production stages an order moves through, from checkout to delivery.
///
/// `Pending` is the sole initial state. `Delivered` and `Cancelled` are
/// terminal. Cancellation is only reachable from `Pending` or `Confirmed`;
/// every other stage may be skipped forward by an administrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    DesignApproved,
    InProduction,
    QualityCheck,
    Packaging,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Cancellation is only permitted before production starts.
    pub fn allows_cancellation(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Confirmed)
    }

    /// True once payment has been confirmed (or any later stage reached).
    /// Used to make duplicate payment confirmations a no-op.
    pub fn payment_confirmed(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }

    /// Human-readable title recorded on timeline entries.
    pub fn title(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Order Placed",
            OrderStatus::Confirmed => "Payment Confirmed",
            OrderStatus::DesignApproved => "Design Approved",
            OrderStatus::InProduction => "In Production",
            OrderStatus::QualityCheck => "Quality Check",
            OrderStatus::Packaging => "Packaging",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::DesignApproved => "design_approved",
            OrderStatus::InProduction => "in_production",
            OrderStatus::QualityCheck => "quality_check",
            OrderStatus::Packaging => "packaging",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "design_approved" => Ok(OrderStatus::DesignApproved),
            "in_production" => Ok(OrderStatus::InProduction),
            "quality_check" => Ok(OrderStatus::QualityCheck),
            "packaging" => Ok(OrderStatus::Packaging),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(PaymentError::ValidationError(format!(
                "unknown order status: {other}"
            ))),
        }
    }
}

/// One entry in an order's append-only status history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub status: OrderStatus,
    pub title: String,
    pub note: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl TimelineEntry {
    pub fn new(status: OrderStatus, note: Option<String>) -> Self {
        Self {
            status,
            title: status.title().to_string(),
            note,
            completed_at: Utc::now(),
        }
    }
}

/// A single customized line item. Prices are computed upstream by the
/// catalog/pricing service and are immutable here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: String,
    pub size: Option<String>,
    #[serde(default)]
    pub accessories: Vec<String>,
    #[serde(default)]
    pub customizations: BTreeMap<String, String>,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
}

/// The order aggregate: line items, current status and the timeline of
/// status changes.
///
/// Invariants: the last timeline entry's status always equals `status`;
/// `total_amount` is the sum of item totals at creation time and never
/// changes afterwards (refunds are tracked on the payment attempt).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub items: Vec<OrderItem>,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub estimated_completion: Option<DateTime<Utc>>,
    pub timeline: Vec<TimelineEntry>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Creates a new order in `Pending` state with its opening timeline
    /// entry. The total is derived from the item totals.
    pub fn new(
        user_id: String,
        email: Option<String>,
        phone: Option<String>,
        items: Vec<OrderItem>,
        estimated_completion: Option<DateTime<Utc>>,
    ) -> Self {
        let total_amount = items.iter().map(|item| item.total_price).sum();
        Self {
            id: Uuid::new_v4(),
            user_id,
            email,
            phone,
            items,
            status: OrderStatus::Pending,
            total_amount,
            estimated_completion,
            timeline: vec![TimelineEntry::new(OrderStatus::Pending, None)],
            created_at: Utc::now(),
        }
    }

    /// Applies a status change and appends the matching timeline entry in
    /// one step, keeping the status/timeline invariant. Guard checks live in
    /// the lifecycle controller; the store calls this under its write lock.
    pub fn record_status(&mut self, entry: TimelineEntry) {
        self.status = entry.status;
        self.timeline.push(entry);
    }

    pub fn last_timeline_status(&self) -> Option<OrderStatus> {
        self.timeline.last().map(|entry| entry.status)
    }
}
