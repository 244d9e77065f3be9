//! HTTP surface: payment operations, order management and the per-provider
//! webhook ingress, all behind one axum router.

pub mod orders;
pub mod payments;
pub mod webhooks;

use crate::application::dispatcher::PaymentDispatcher;
use crate::application::lifecycle::OrderLifecycle;
use crate::config::AppConfig;
use crate::domain::ports::SharedOrderStore;
use crate::error::PaymentError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub orders: SharedOrderStore,
    pub lifecycle: Arc<OrderLifecycle>,
    pub dispatcher: Arc<PaymentDispatcher>,
}

pub fn router(state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/healthz", get(healthz))
        .route("/orders", post(orders::create_order))
        .route("/orders/{id}", get(orders::get_order))
        .route("/orders/{id}/status", put(orders::update_order_status))
        .route("/payments/create", post(payments::create_payment))
        .route("/payments/verify/{id}", get(payments::verify_payment))
        .route("/payments/{id}/refund", post(payments::refund_payment))
        .route("/payments/methods", get(payments::list_methods))
        .route("/payments/webhook/{provider}", post(webhooks::receive_webhook))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

/// Standard success envelope.
pub(crate) fn ok(data: impl Serialize) -> Json<Value> {
    Json(json!({ "success": true, "data": data }))
}

/// Error wrapper giving every `PaymentError` a status code and a stable
/// error envelope.
pub struct ApiError(pub PaymentError);

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            PaymentError::OrderNotFound(_) => StatusCode::NOT_FOUND,
            PaymentError::InvalidTransition(_)
            | PaymentError::UnsupportedMethod(_)
            | PaymentError::ValidationError(_) => StatusCode::BAD_REQUEST,
            PaymentError::AuthenticationFailed(_) => StatusCode::UNAUTHORIZED,
            PaymentError::PaymentNotCompleted(_) => StatusCode::PAYMENT_REQUIRED,
            PaymentError::GatewayNotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            PaymentError::ProviderUnavailable(_) => StatusCode::BAD_GATEWAY,
            PaymentError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({
            "success": false,
            "error": { "code": self.0.code(), "message": self.0.to_string() },
        }));
        (status, body).into_response()
    }
}
