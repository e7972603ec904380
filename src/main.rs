use std::sync::{Arc, Mutex};

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use greenthumb::config::AppConfig;
use greenthumb::db;
use greenthumb::handlers;
use greenthumb::services::gateway::razorpay::RazorpayProvider;
use greenthumb::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    if config.razorpay_key_id.is_empty() || config.razorpay_key_secret.is_empty() {
        tracing::warn!("Razorpay keys not configured; payment order creation will fail");
    }
    let gateway = RazorpayProvider::new(
        config.razorpay_key_id.clone(),
        config.razorpay_key_secret.clone(),
    );

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        gateway: Box::new(gateway),
    });

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route(
            "/api/services/:slug/book",
            post(handlers::bookings::create_booking),
        )
        .route(
            "/api/services/:slug/slots",
            get(handlers::bookings::get_slots),
        )
        .route(
            "/api/bookings/:id",
            get(handlers::bookings::get_booking)
                .patch(handlers::bookings::patch_booking)
                .delete(handlers::bookings::cancel_booking),
        )
        .route(
            "/api/payments/booking/:id/order",
            post(handlers::payments::create_order),
        )
        .route(
            "/api/payments/booking/verify",
            post(handlers::payments::verify_payment),
        )
        .route("/api/account/orders", get(handlers::account::get_orders))
        .route(
            "/api/account/reminders",
            get(handlers::account::get_reminders),
        )
        .route("/api/admin/status", get(handlers::admin::get_status))
        .route("/api/admin/bookings", get(handlers::admin::get_bookings))
        .route("/api/admin/orders", get(handlers::admin::get_orders))
        .route("/api/admin/cleanup", post(handlers::admin::cleanup_stale))
        .route(
            "/api/admin/users/:email/hold",
            post(handlers::admin::set_user_hold),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
