use serde::Deserialize;
use std::env;

/// Process configuration, built once in `main` and passed by reference into
/// the dispatcher and lifecycle controller constructors. No ambient global
/// state.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub http: HttpConfig,
    /// ISO currency code the deployment operates in. Order amounts are
    /// currency-less decimals; this is attached at the provider boundary.
    pub currency: String,
    pub callbacks: CallbackConfig,
    pub production_lead_days: i64,
    pub gateways: GatewaysConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub address: String,
}

/// Defaults for the buyer redirect URLs when a create-payment request does
/// not supply its own.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackConfig {
    pub return_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewaysConfig {
    pub stripe: StripeConfig,
    pub paypal: PaypalConfig,
    pub wechat: WechatConfig,
    pub alipay: AlipayConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub api_base: String,
}

impl StripeConfig {
    pub fn is_configured(&self) -> bool {
        !self.secret_key.is_empty() && !self.webhook_secret.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaypalConfig {
    pub client_id: String,
    pub client_secret: String,
    pub webhook_id: String,
    pub api_base: String,
}

impl PaypalConfig {
    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WechatConfig {
    pub mch_id: String,
    pub api_key: String,
    pub api_base: String,
    pub notify_url: String,
}

impl WechatConfig {
    pub fn is_configured(&self) -> bool {
        !self.mch_id.is_empty() && !self.api_key.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlipayConfig {
    pub app_id: String,
    pub sign_key: String,
    pub api_base: String,
    pub notify_url: String,
}

impl AlipayConfig {
    pub fn is_configured(&self) -> bool {
        !self.app_id.is_empty() && !self.sign_key.is_empty()
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

impl AppConfig {
    /// Reads configuration from the environment. Missing provider
    /// credentials are allowed; the affected adapter reports itself
    /// unconfigured but stays registered.
    pub fn from_env() -> Self {
        Self {
            http: HttpConfig {
                address: var_or("HTTP_ADDRESS", "0.0.0.0:8080"),
            },
            currency: var_or("CURRENCY", "usd"),
            callbacks: CallbackConfig {
                return_url: var_or("PAYMENT_RETURN_URL", "http://localhost:3000/payment/return"),
                cancel_url: var_or("PAYMENT_CANCEL_URL", "http://localhost:3000/payment/cancel"),
            },
            production_lead_days: env::var("PRODUCTION_LEAD_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(14),
            gateways: GatewaysConfig {
                stripe: StripeConfig {
                    secret_key: var_or("STRIPE_SECRET_KEY", ""),
                    webhook_secret: var_or("STRIPE_WEBHOOK_SECRET", ""),
                    api_base: var_or("STRIPE_API_BASE", "https://api.stripe.com"),
                },
                paypal: PaypalConfig {
                    client_id: var_or("PAYPAL_CLIENT_ID", ""),
                    client_secret: var_or("PAYPAL_CLIENT_SECRET", ""),
                    webhook_id: var_or("PAYPAL_WEBHOOK_ID", ""),
                    api_base: var_or("PAYPAL_API_BASE", "https://api-m.paypal.com"),
                },
                wechat: WechatConfig {
                    mch_id: var_or("WECHAT_MCH_ID", ""),
                    api_key: var_or("WECHAT_API_KEY", ""),
                    api_base: var_or("WECHAT_API_BASE", "https://api.mch.weixin.qq.com"),
                    notify_url: var_or("WECHAT_NOTIFY_URL", ""),
                },
                alipay: AlipayConfig {
                    app_id: var_or("ALIPAY_APP_ID", ""),
                    sign_key: var_or("ALIPAY_SIGN_KEY", ""),
                    api_base: var_or("ALIPAY_API_BASE", "https://openapi.alipay.com"),
                    notify_url: var_or("ALIPAY_NOTIFY_URL", ""),
                },
            },
        }
    }
}
