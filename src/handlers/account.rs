use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::Order;
use crate::services::{billing, clock};
use crate::state::AppState;

use super::customer_email;

// GET /api/account/orders
pub async fn get_orders(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Order>>, AppError> {
    let email = customer_email(&headers)?;
    let db = state.db.lock().unwrap();
    let orders = queries::orders_for_email(&db, &email)?;
    Ok(Json(orders))
}

// GET /api/account/reminders
pub async fn get_reminders(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<billing::Reminder>>, AppError> {
    let email = customer_email(&headers)?;
    let db = state.db.lock().unwrap();
    let reminders = billing::monthly_reminders(&db, &email, clock::now())?;
    Ok(Json(reminders))
}
