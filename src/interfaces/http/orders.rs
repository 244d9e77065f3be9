use super::{ApiError, AppState, ok};
use crate::domain::order::{Order, OrderItem, OrderStatus};
use crate::error::PaymentError;
use axum::Json;
use axum::extract::{Path, State};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrderItem {
    pub product_id: String,
    pub size: Option<String>,
    #[serde(default)]
    pub accessories: Vec<String>,
    #[serde(default)]
    pub customizations: BTreeMap<String, String>,
    pub quantity: u32,
    pub unit_price: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub user_id: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub items: Vec<NewOrderItem>,
}

/// Creates a pending order from priced line items. Pricing itself happens
/// upstream in the catalog; this endpoint only derives line totals and the
/// estimated completion date.
pub async fn create_order(
    State(state): State<AppState>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<Json<Value>, ApiError> {
    if req.items.is_empty() {
        return Err(PaymentError::ValidationError("order has no items".to_string()).into());
    }
    let items: Vec<OrderItem> = req
        .items
        .into_iter()
        .map(|item| {
            if item.quantity == 0 {
                return Err(PaymentError::ValidationError(format!(
                    "item {} has zero quantity",
                    item.product_id
                )));
            }
            let total_price = item.unit_price * Decimal::from(item.quantity);
            Ok(OrderItem {
                product_id: item.product_id,
                size: item.size,
                accessories: item.accessories,
                customizations: item.customizations,
                quantity: item.quantity,
                unit_price: item.unit_price,
                total_price,
            })
        })
        .collect::<Result<_, _>>()?;

    let estimated = Utc::now() + Duration::days(state.config.production_lead_days);
    let order = Order::new(req.user_id, req.email, req.phone, items, Some(estimated));
    state.orders.insert_order(order.clone()).await?;
    tracing::info!(order_id = %order.id, total = %order.total_amount, "order created");

    Ok(ok(&order))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let order = state
        .orders
        .get_order(id)
        .await?
        .ok_or(PaymentError::OrderNotFound(id))?;
    Ok(ok(&order))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    pub note: Option<String>,
}

/// Administrative transition: production staff move orders through the
/// pipeline (skips allowed), and support cancels where the guard permits.
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, ApiError> {
    let target: OrderStatus = req.status.parse()?;
    let outcome = state.lifecycle.transition(id, target, req.note).await?;
    state.lifecycle.notify(&outcome).await;
    Ok(ok(&outcome.order))
}
