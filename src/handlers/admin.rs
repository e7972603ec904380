use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, Order};
use crate::services::clock;
use crate::state::AppState;

use super::require_admin;

// GET /api/admin/status
#[derive(Serialize)]
pub struct StatusResponse {
    pub pending_bookings: i64,
    pub confirmed_bookings: i64,
    pub cancelled_bookings: i64,
    pub paid_orders: i64,
}

pub async fn get_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, AppError> {
    require_admin(&headers, &state.config.admin_token)?;

    let db = state.db.lock().unwrap();
    let stats = queries::get_dashboard_stats(&db)?;

    Ok(Json(StatusResponse {
        pending_bookings: stats.pending_bookings,
        confirmed_bookings: stats.confirmed_bookings,
        cancelled_bookings: stats.cancelled_bookings,
        paid_orders: stats.paid_orders,
    }))
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

// GET /api/admin/bookings
pub async fn get_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    require_admin(&headers, &state.config.admin_token)?;

    let db = state.db.lock().unwrap();
    let bookings =
        queries::get_all_bookings(&db, query.status.as_deref(), query.limit.unwrap_or(50))?;
    Ok(Json(bookings))
}

// GET /api/admin/orders
pub async fn get_orders(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Order>>, AppError> {
    require_admin(&headers, &state.config.admin_token)?;

    let db = state.db.lock().unwrap();
    let orders = queries::get_all_orders(&db, query.status.as_deref(), query.limit.unwrap_or(50))?;
    Ok(Json(orders))
}

// POST /api/admin/cleanup
#[derive(Serialize)]
pub struct CleanupResponse {
    pub cancelled: usize,
}

/// Sweeps PENDING bookings whose slot start passed more than a day ago.
/// Auxiliary housekeeping; slot correctness never depends on it.
pub async fn cleanup_stale(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<CleanupResponse>, AppError> {
    require_admin(&headers, &state.config.admin_token)?;

    let cutoff = clock::now() - Duration::hours(24);
    let db = state.db.lock().unwrap();
    let cancelled =
        queries::cancel_stale_pending(&db, clock::today(cutoff), clock::minutes_of_day(cutoff))?;

    tracing::info!(cancelled, "stale pending bookings swept");
    Ok(Json(CleanupResponse { cancelled }))
}

// POST /api/admin/users/:email/hold
#[derive(Deserialize)]
pub struct HoldRequest {
    pub on_hold: bool,
}

pub async fn set_user_hold(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(email): Path<String>,
    Json(req): Json<HoldRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_admin(&headers, &state.config.admin_token)?;

    let db = state.db.lock().unwrap();
    queries::ensure_user(&db, &email)?;
    queries::set_user_hold(&db, &email, req.on_hold)?;

    Ok(Json(serde_json::json!({ "email": email, "on_hold": req.on_hold })))
}
