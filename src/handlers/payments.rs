use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::Booking;
use crate::services::gateway::GatewayOrder;
use crate::services::{billing, clock, reconcile};
use crate::state::AppState;

use super::customer_email;

// POST /api/payments/booking/:id/order
#[derive(Serialize)]
pub struct CreateOrderResponse {
    pub booking_id: String,
    pub order: GatewayOrder,
}

pub async fn create_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<CreateOrderResponse>, AppError> {
    let email = customer_email(&headers)?;
    let now = clock::now();

    // Decide the amount under the lock, then call the gateway without it.
    let (booking, amount_paise) = {
        let db = state.db.lock().unwrap();

        let user = queries::ensure_user(&db, &email)?;
        if user.is_on_hold {
            return Err(AppError::Forbidden(
                "your account is on hold; please contact support".to_string(),
            ));
        }

        let booking = queries::get_booking(&db, &id)?
            .ok_or_else(|| AppError::NotFound(format!("booking {id}")))?;
        let amount = billing::payable_amount(&db, &state.config.bookings, now, &booking)?;
        (booking, amount)
    };

    let notes = serde_json::json!({
        "bookingId": booking.id,
        "customerName": booking.customer_name,
        "customerPhone": booking.customer_phone,
        "customerEmail": booking.customer_email,
    });
    let receipt = format!("booking_{}", booking.id);
    let order = state
        .gateway
        .create_order(amount_paise, "INR", &receipt, notes)
        .await
        .map_err(|e| AppError::GatewayUnavailable(e.to_string()))?;

    {
        let db = state.db.lock().unwrap();
        queries::set_gateway_order_id(&db, &booking.id, &order.id)?;
    }

    tracing::info!(booking_id = %booking.id, order_id = %order.id, amount_paise, "gateway order created");

    Ok(Json(CreateOrderResponse {
        booking_id: booking.id,
        order,
    }))
}

// POST /api/payments/booking/verify
#[derive(Serialize)]
pub struct VerifyResponse {
    pub confirmed: bool,
    pub booking: Booking,
}

pub async fn verify_payment(
    State(state): State<Arc<AppState>>,
    Json(callback): Json<reconcile::PaymentCallback>,
) -> Result<Json<VerifyResponse>, AppError> {
    let now = clock::now();
    let mut db = state.db.lock().unwrap();

    let booking = reconcile::verify_and_confirm(
        &mut db,
        &state.config.bookings,
        &state.config.razorpay_key_secret,
        now,
        &callback,
    )?;

    Ok(Json(VerifyResponse {
        confirmed: true,
        booking,
    }))
}
