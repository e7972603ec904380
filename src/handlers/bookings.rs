use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, BookingStatus, OrderStatus};
use crate::services::{clock, lifecycle, slots};
use crate::state::AppState;

use super::{customer_email, is_admin};

// POST /api/services/:slug/book
#[derive(Serialize)]
pub struct CreateBookingResponse {
    pub booking_id: String,
    pub requires_immediate_payment: bool,
    pub payment_handoff_url: String,
    pub booking: Booking,
}

pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    headers: HeaderMap,
    Json(req): Json<lifecycle::CreateBookingRequest>,
) -> Result<Json<CreateBookingResponse>, AppError> {
    let email = customer_email(&headers)?;
    let now = clock::now();

    let db = state.db.lock().unwrap();

    let service = queries::get_service_by_slug(&db, &slug)?
        .ok_or_else(|| AppError::NotFound(format!("service {slug}")))?;

    let user = queries::ensure_user(&db, &email)?;
    if user.is_on_hold {
        return Err(AppError::Forbidden(
            "your account is on hold; please contact support".to_string(),
        ));
    }

    let outcome =
        lifecycle::create_booking(&db, &state.config.bookings, now, &service, &email, &req)?;

    Ok(Json(CreateBookingResponse {
        booking_id: outcome.booking.id.clone(),
        requires_immediate_payment: outcome.requires_immediate_payment,
        payment_handoff_url: outcome.payment_handoff_url,
        booking: outcome.booking,
    }))
}

// GET /api/services/:slug/slots?date=YYYY-MM-DD
#[derive(Deserialize)]
pub struct SlotsQuery {
    pub date: String,
}

#[derive(Serialize)]
pub struct SlotsResponse {
    pub date: String,
    pub capacity_per_slot: i64,
    /// Start minutes already at capacity; everything else is free.
    pub booked: Vec<i64>,
}

pub async fn get_slots(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<SlotsResponse>, AppError> {
    let date = NaiveDate::parse_from_str(query.date.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::Validation("invalid date".to_string()))?;

    let db = state.db.lock().unwrap();
    let service = queries::get_service_by_slug(&db, &slug)?
        .ok_or_else(|| AppError::NotFound(format!("service {slug}")))?;

    let capacity = state.config.bookings.capacity_per_slot;
    let booked = slots::booked_start_minutes(&db, &service.id, date, capacity)?;

    Ok(Json(SlotsResponse {
        date: query.date.trim().to_string(),
        capacity_per_slot: capacity,
        booked,
    }))
}

// GET /api/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    let db = state.db.lock().unwrap();
    let booking = queries::get_booking(&db, &id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {id}")))?;
    Ok(Json(booking))
}

// PATCH /api/bookings/:id
#[derive(Deserialize, Default)]
pub struct PatchBookingRequest {
    pub date: Option<String>,
    pub start_minutes: Option<i64>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
    pub notes: Option<String>,
    pub plan_type: Option<String>,
    pub monthly_day: Option<u32>,
    // Admin-only fields.
    pub status: Option<String>,
    pub inspection_completed: Option<bool>,
    pub service_completed: Option<bool>,
    pub plan_price_paise: Option<i64>,
}

pub async fn patch_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<PatchBookingRequest>,
) -> Result<Json<Booking>, AppError> {
    let admin = is_admin(&headers, &state.config.admin_token);
    if !admin
        && (req.status.is_some()
            || req.inspection_completed.is_some()
            || req.service_completed.is_some()
            || req.plan_price_paise.is_some())
    {
        return Err(AppError::Forbidden(
            "not allowed to update status or completion".to_string(),
        ));
    }

    let now = clock::now();
    let db = state.db.lock().unwrap();
    let rules = &state.config.bookings;

    if queries::get_booking(&db, &id)?.is_none() {
        return Err(AppError::NotFound(format!("booking {id}")));
    }

    if req.date.is_some() || req.start_minutes.is_some() {
        lifecycle::reschedule(&db, rules, now, &id, req.date.as_deref(), req.start_minutes)?;
    }

    if req.customer_name.is_some()
        || req.customer_phone.is_some()
        || req.customer_email.is_some()
        || req.notes.is_some()
    {
        queries::update_booking_contact(
            &db,
            &id,
            req.customer_name.as_deref(),
            req.customer_phone.as_deref(),
            req.customer_email.as_deref(),
            req.notes.as_deref(),
        )?;
    }

    // Plan selection is priced server-side off the service base.
    if let Some(plan_type) = req.plan_type.as_deref() {
        lifecycle::select_plan(&db, rules.minimum_charge_paise, &id, plan_type, req.monthly_day)?;
    }

    if admin {
        if req.inspection_completed.is_some() || req.service_completed.is_some() {
            lifecycle::set_completion_flags(
                &db,
                &id,
                req.inspection_completed,
                req.service_completed,
            )?;
        }
        if let Some(status) = req.status.as_deref() {
            // Administrative override sits outside the automated machine.
            if !["PENDING", "CONFIRMED", "CANCELLED"].contains(&status) {
                return Err(AppError::Validation("invalid status".to_string()));
            }
            let status = BookingStatus::from_str(status);
            queries::update_booking_status(&db, &id, status)?;
            if status == BookingStatus::Cancelled {
                queries::set_order_status(&db, &id, OrderStatus::Cancelled)?;
            }
        }
        if let Some(price) = req.plan_price_paise {
            if price < 0 {
                return Err(AppError::Validation("invalid plan price".to_string()));
            }
            let booking = queries::get_booking(&db, &id)?
                .ok_or_else(|| AppError::NotFound(format!("booking {id}")))?;
            if booking.amount_paid_paise > 0 {
                return Err(AppError::InvalidState(
                    "plan price is locked after a verified payment".to_string(),
                ));
            }
            queries::set_booking_plan(&db, &id, booking.plan_type, price, booking.monthly_day)?;
        }
    }

    let booking = queries::get_booking(&db, &id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {id}")))?;
    Ok(Json(booking))
}

// DELETE /api/bookings/:id
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    let now = clock::now();
    let db = state.db.lock().unwrap();
    let booking = lifecycle::cancel(&db, &state.config.bookings, now, &id)?;
    Ok(Json(booking))
}
