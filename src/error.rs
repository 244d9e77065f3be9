use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, PaymentError>;

/// Error taxonomy shared by the lifecycle controller, the dispatcher and the
/// gateway adapters. Raw provider errors never cross an adapter boundary;
/// they are wrapped into one of these variants first.
#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("unsupported payment method: {0}")]
    UnsupportedMethod(String),
    #[error("gateway not configured: {0}")]
    GatewayNotConfigured(String),
    #[error("webhook authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("payment not completed: {0}")]
    PaymentNotCompleted(String),
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    #[error("order not found: {0}")]
    OrderNotFound(Uuid),
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("validation error: {0}")]
    ValidationError(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl PaymentError {
    /// Stable machine-readable code carried in API error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            PaymentError::UnsupportedMethod(_) => "UnsupportedMethod",
            PaymentError::GatewayNotConfigured(_) => "GatewayNotConfigured",
            PaymentError::AuthenticationFailed(_) => "AuthenticationFailed",
            PaymentError::PaymentNotCompleted(_) => "PaymentNotCompleted",
            PaymentError::InvalidTransition(_) => "InvalidTransition",
            PaymentError::OrderNotFound(_) => "OrderNotFound",
            PaymentError::ProviderUnavailable(_) => "ProviderUnavailable",
            PaymentError::ValidationError(_) => "ValidationError",
            PaymentError::Internal(_) => "Internal",
        }
    }
}

impl From<reqwest::Error> for PaymentError {
    fn from(err: reqwest::Error) -> Self {
        PaymentError::ProviderUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for PaymentError {
    fn from(err: serde_json::Error) -> Self {
        PaymentError::Internal(format!("serialization error: {err}"))
    }
}
