use clap::Parser;
use miette::{IntoDiagnostic, Result};
use orderflow::application::dispatcher::PaymentDispatcher;
use orderflow::application::lifecycle::OrderLifecycle;
use orderflow::config::AppConfig;
use orderflow::domain::ports::{SharedAttemptStore, SharedGateway, SharedOrderStore};
use orderflow::infrastructure::gateways::alipay::AlipayGateway;
use orderflow::infrastructure::gateways::paypal::PaypalGateway;
use orderflow::infrastructure::gateways::stripe::StripeGateway;
use orderflow::infrastructure::gateways::wechat::WechatGateway;
use orderflow::infrastructure::in_memory::{InMemoryAttemptStore, InMemoryOrderStore};
use orderflow::infrastructure::notify::TracingNotifier;
use orderflow::interfaces::http::{AppState, router};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Bind address override (otherwise HTTP_ADDRESS or 0.0.0.0:8080)
    #[arg(long)]
    address: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut config = AppConfig::from_env();
    if let Some(address) = cli.address {
        config.http.address = address;
    }
    let config = Arc::new(config);

    let orders: SharedOrderStore = Arc::new(InMemoryOrderStore::new());
    let attempts: SharedAttemptStore = Arc::new(InMemoryAttemptStore::new());

    let gateways: Vec<SharedGateway> = vec![
        Arc::new(
            StripeGateway::new(config.gateways.stripe.clone(), config.currency.clone())
                .into_diagnostic()?,
        ),
        Arc::new(
            PaypalGateway::new(config.gateways.paypal.clone(), config.currency.clone())
                .into_diagnostic()?,
        ),
        Arc::new(
            WechatGateway::new(config.gateways.wechat.clone(), config.currency.clone())
                .into_diagnostic()?,
        ),
        Arc::new(AlipayGateway::new(config.gateways.alipay.clone()).into_diagnostic()?),
    ];

    let dispatcher = Arc::new(PaymentDispatcher::new(
        gateways,
        orders.clone(),
        attempts,
        config.currency.clone(),
    ));
    let lifecycle = Arc::new(OrderLifecycle::new(
        orders.clone(),
        Arc::new(TracingNotifier::new()),
    ));

    for method in dispatcher.supported_methods() {
        info!(%method, "payment gateway registered");
    }

    let state = AppState {
        config: config.clone(),
        orders,
        lifecycle,
        dispatcher,
    };

    let listener = tokio::net::TcpListener::bind(&config.http.address)
        .await
        .into_diagnostic()?;
    info!(address = %config.http.address, "orderflow listening");
    axum::serve(listener, router(state)).await.into_diagnostic()?;

    Ok(())
}
