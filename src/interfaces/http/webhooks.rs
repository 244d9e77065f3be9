use super::{ApiError, AppState, ok};
use crate::domain::payment::{
    NormalizedEvent, PaymentMethod, PaymentStatus, WebhookEventKind, WebhookSignature,
};
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use serde_json::Value;
use tracing::{error, info, warn};

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Pulls the provider-specific authentication material out of the request
/// headers.
fn extract_signature(method: PaymentMethod, headers: &HeaderMap) -> WebhookSignature {
    match method {
        PaymentMethod::Stripe => WebhookSignature {
            primary: header(headers, "stripe-signature"),
            ..WebhookSignature::default()
        },
        PaymentMethod::Paypal => WebhookSignature {
            primary: header(headers, "paypal-transmission-sig"),
            transmission_id: header(headers, "paypal-transmission-id"),
            transmission_time: header(headers, "paypal-transmission-time"),
            cert_url: header(headers, "paypal-cert-url"),
            auth_algo: header(headers, "paypal-auth-algo"),
        },
        PaymentMethod::Wechat => WebhookSignature {
            primary: header(headers, "wechatpay-signature"),
            ..WebhookSignature::default()
        },
        PaymentMethod::Alipay => WebhookSignature {
            primary: header(headers, "alipay-signature"),
            ..WebhookSignature::default()
        },
    }
}

/// Per-provider webhook entry point.
///
/// Authentication failures short-circuit with 401 before any state is
/// touched. Once an event is authenticated and applied (or found to be a
/// replay), the provider gets a success ack even when downstream
/// notification fails, so the provider does not start redelivering.
pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let method: PaymentMethod = provider.parse()?;
    let signature = extract_signature(method, &headers);

    let event = match state.dispatcher.handle_webhook(method, &body, &signature).await {
        Ok(event) => event,
        Err(err @ crate::error::PaymentError::AuthenticationFailed(_)) => {
            // Distinct from business-level rejection: someone sent us a
            // payload we could not authenticate.
            warn!(%method, %err, "webhook rejected");
            return Err(err.into());
        }
        Err(err) => {
            error!(%method, %err, "webhook processing failed");
            return Err(err.into());
        }
    };

    apply_event(&state, &event).await;

    Ok(ok(serde_json::json!({
        "type": event.kind,
        "method": event.method,
        "orderId": event.order_id,
        "transactionId": event.transaction_id,
        "rawType": event.raw_type,
    })))
}

/// Applies a normalized event to order and attempt state. Failures here are
/// logged, not returned: the event has been durably accepted.
async fn apply_event(state: &AppState, event: &NormalizedEvent) {
    let attempt_status = match event.kind {
        WebhookEventKind::PaymentCompleted => Some(PaymentStatus::Completed),
        WebhookEventKind::PaymentFailed => Some(PaymentStatus::Failed),
        WebhookEventKind::Refunded => Some(PaymentStatus::Refunded),
        WebhookEventKind::Other => None,
    };

    let Some(order_id) = event.order_id else {
        if event.kind != WebhookEventKind::Other {
            warn!(kind = ?event.kind, txn = %event.transaction_id, "webhook event carries no order id");
        }
        return;
    };

    if let Some(status) = attempt_status
        && let Err(err) = state.dispatcher.finalize_active(order_id, status).await
    {
        error!(%order_id, %err, "failed to finalize payment attempt");
    }

    if event.kind == WebhookEventKind::PaymentCompleted {
        let note = format!(
            "paid via {} ({})",
            event.method.display_name(),
            event.transaction_id
        );
        match state.lifecycle.confirm_payment(order_id, Some(note)).await {
            Ok(outcome) => {
                state.lifecycle.notify(&outcome).await;
                if outcome.changed {
                    info!(%order_id, txn = %event.transaction_id, "order confirmed by webhook");
                }
            }
            Err(err) => {
                // Unknown order or similar: ack anyway so the provider does
                // not hammer us with redeliveries.
                error!(%order_id, %err, "webhook confirmation not applied");
            }
        }
    }
}
