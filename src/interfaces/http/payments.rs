use super::{ApiError, AppState, ok};
use crate::domain::payment::PaymentMethod;
use axum::Json;
use axum::extract::{Path, Query, State};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub order_id: Uuid,
    pub method: String,
    pub return_url: Option<String>,
    pub cancel_url: Option<String>,
}

pub async fn create_payment(
    State(state): State<AppState>,
    Json(req): Json<CreatePaymentRequest>,
) -> Result<Json<Value>, ApiError> {
    let method: PaymentMethod = req.method.parse()?;
    let return_url = req
        .return_url
        .unwrap_or_else(|| state.config.callbacks.return_url.clone());
    let cancel_url = req
        .cancel_url
        .unwrap_or_else(|| state.config.callbacks.cancel_url.clone());

    let handle = state
        .dispatcher
        .create_payment(method, req.order_id, &return_url, &cancel_url)
        .await?;

    Ok(ok(json!({
        "sessionId": handle.session_id,
        "method": handle.method,
        "url": handle.checkout_url,
        "qrCode": handle.qr_code,
        "expiresAt": handle.expires_at,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyQuery {
    pub method: String,
    pub order_id: Option<Uuid>,
}

/// Synchronous verification, typically hit by the buyer's return
/// navigation. A successful result drives the same confirmation path the
/// webhook uses, so whichever arrives first wins and the other becomes a
/// no-op.
pub async fn verify_payment(
    State(state): State<AppState>,
    Path(handle_id): Path<String>,
    Query(query): Query<VerifyQuery>,
) -> Result<Json<Value>, ApiError> {
    let method: PaymentMethod = query.method.parse()?;
    let result = state.dispatcher.verify_payment(method, &handle_id).await?;

    if result.success {
        if let Some(order_id) = query.order_id {
            let note = format!("paid via {} ({})", method.display_name(), result.transaction_id);
            let outcome = state.lifecycle.confirm_payment(order_id, Some(note)).await?;
            state.lifecycle.notify(&outcome).await;
        }
        Ok(ok(&result))
    } else {
        // Not an error from the provider's point of view; the session just
        // hasn't settled. Callers poll again or wait for the webhook.
        Ok(Json(json!({
            "success": false,
            "code": "PaymentNotCompleted",
            "data": result,
        })))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    pub method: String,
    pub amount: Option<Decimal>,
    pub reason: Option<String>,
}

pub async fn refund_payment(
    State(state): State<AppState>,
    Path(handle_id): Path<String>,
    Json(req): Json<RefundRequest>,
) -> Result<Json<Value>, ApiError> {
    let method: PaymentMethod = req.method.parse()?;
    if let Some(amount) = req.amount
        && amount <= Decimal::ZERO
    {
        return Err(crate::error::PaymentError::ValidationError(
            "refund amount must be positive".to_string(),
        )
        .into());
    }

    let result = state
        .dispatcher
        .refund_payment(method, &handle_id, req.amount)
        .await?;
    tracing::info!(
        handle = %handle_id,
        reason = req.reason.as_deref().unwrap_or("-"),
        "refund processed"
    );
    Ok(ok(&result))
}

pub async fn list_methods(State(state): State<AppState>) -> Json<Value> {
    ok(state.dispatcher.method_infos())
}
