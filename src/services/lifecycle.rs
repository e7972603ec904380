use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use serde::Deserialize;
use uuid::Uuid;

use crate::config::BookingRules;
use crate::db::queries;
use crate::errors::AppError;
use crate::models::{
    Booking, BookingStatus, BookingType, Order, OrderStatus, PlanType, Service, ServiceCategory,
    BOOKING_DURATION_MINUTES,
};
use crate::services::{clock, pricing, slots};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBookingRequest {
    pub date: String,
    pub start_minutes: i64,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: Option<String>,
    pub address_line1: String,
    pub address_line2: Option<String>,
    pub city: String,
    pub region: Option<String>,
    pub postal_code: String,
    pub notes: Option<String>,
    #[serde(flatten)]
    pub plan: pricing::PlanInputs,
}

#[derive(Debug)]
pub struct CreateBookingOutcome {
    pub booking: Booking,
    pub requires_immediate_payment: bool,
    pub payment_handoff_url: String,
}

/// Creates a PENDING booking plus its optimistic PENDING order projection.
/// PENDING holds no slot; the slot is claimed by payment reconciliation.
pub fn create_booking(
    conn: &Connection,
    rules: &BookingRules,
    now: DateTime<Utc>,
    service: &Service,
    identity_email: &str,
    req: &CreateBookingRequest,
) -> Result<CreateBookingOutcome, AppError> {
    if req.customer_name.trim().is_empty() || req.customer_phone.trim().is_empty() {
        return Err(AppError::Validation("missing required fields".to_string()));
    }
    if req.address_line1.trim().is_empty()
        || req.city.trim().is_empty()
        || req.postal_code.trim().is_empty()
    {
        return Err(AppError::Validation(
            "address line 1, city and pincode are required".to_string(),
        ));
    }

    let pin = req.postal_code.trim();
    if !valid_pincode(pin) {
        return Err(AppError::Validation(
            "please enter a valid 6-digit pincode".to_string(),
        ));
    }
    if !pincode_allowed(pin, &rules.allowed_pincode_prefixes) {
        return Err(AppError::Validation(
            "service is not available for this pincode yet".to_string(),
        ));
    }

    if !(0..24 * 60).contains(&req.start_minutes) {
        return Err(AppError::Validation("invalid start time".to_string()));
    }

    let date = NaiveDate::parse_from_str(req.date.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::Validation("invalid date".to_string()))?;

    let today = clock::today(now);
    let now_minutes = clock::minutes_of_day(now);

    if date < today {
        return Err(AppError::PastTime("cannot book a past date".to_string()));
    }
    if date == today && req.start_minutes <= now_minutes {
        return Err(AppError::PastTime("cannot book a past time slot".to_string()));
    }
    if rules.blackout_dates.iter().any(|d| d == req.date.trim()) {
        return Err(AppError::Validation(
            "bookings are not available on the selected date".to_string(),
        ));
    }
    if (date - today).num_days() > rules.booking_max_days_advance {
        return Err(AppError::Validation(format!(
            "bookings allowed only up to {} days in advance",
            rules.booking_max_days_advance
        )));
    }
    if date == today && now_minutes > rules.same_day_cutoff_minutes {
        return Err(AppError::Validation(
            "same-day booking cutoff has passed".to_string(),
        ));
    }

    if slots::is_full(conn, &service.id, date, req.start_minutes, rules.capacity_per_slot)? {
        return Err(AppError::CapacityExceeded("selected slot is full".to_string()));
    }

    let quote = pricing::quote_for_service(service, &req.plan)?;

    let created_at = now.naive_utc();
    let booking = Booking {
        id: Uuid::new_v4().to_string(),
        service_id: service.id.clone(),
        date,
        start_minutes: req.start_minutes,
        duration_minutes: BOOKING_DURATION_MINUTES,
        booking_type: match service.category {
            ServiceCategory::Inspection => BookingType::Inspection,
            ServiceCategory::Maintenance => BookingType::Maintenance,
        },
        status: BookingStatus::Pending,
        plan_type: quote.plan_type,
        plan_price_paise: quote.plan_price_paise,
        monthly_day: quote.monthly_day,
        inspection_completed: false,
        service_completed: false,
        gateway_order_id: None,
        amount_paid_paise: 0,
        customer_name: req.customer_name.trim().to_string(),
        customer_phone: req.customer_phone.trim().to_string(),
        customer_email: Some(identity_email.to_string()),
        address_line1: req.address_line1.trim().to_string(),
        address_line2: req.address_line2.clone(),
        city: req.city.trim().to_string(),
        region: req.region.clone(),
        postal_code: pin.to_string(),
        notes: req.notes.clone(),
        created_at,
        updated_at: created_at,
    };
    queries::create_booking(conn, &booking)?;

    // Optimistic projection so the booking shows in the customer's orders
    // immediately; reconciliation flips it to PAID.
    let order_amount = if booking.booking_type == BookingType::Inspection {
        0
    } else if quote.plan_price_paise > 0 {
        quote.plan_price_paise
    } else {
        pricing::service_default_paise(service, rules.minimum_charge_paise)
    };
    let address = [
        booking.address_line1.as_str(),
        booking.address_line2.as_deref().unwrap_or(""),
    ]
    .iter()
    .filter(|s| !s.is_empty())
    .cloned()
    .collect::<Vec<_>>()
    .join(", ");
    let order = Order {
        id: booking.id.clone(),
        customer: booking.customer_name.clone(),
        email: booking.customer_email.clone(),
        phone: Some(booking.customer_phone.clone()),
        address,
        city: booking.city.clone(),
        pincode: booking.postal_code.clone(),
        total_paise: order_amount,
        status: OrderStatus::Pending,
        gateway_payment_id: None,
        payment_method: "Razorpay".to_string(),
        payment_details: Some(serde_json::json!({
            "type": "service",
            "serviceName": service.name,
            "date": req.date.trim(),
            "startMinutes": booking.start_minutes,
            "bookingId": booking.id,
        })),
        created_at,
        updated_at: created_at,
    };
    if let Err(e) = queries::create_pending_order(conn, &order) {
        // The projection is a convenience; the booking stands without it.
        tracing::error!(error = %e, booking_id = %booking.id, "failed to create pending order");
    }

    tracing::info!(
        booking_id = %booking.id,
        service = %service.slug,
        date = %req.date,
        start_minutes = booking.start_minutes,
        "booking created"
    );

    Ok(CreateBookingOutcome {
        payment_handoff_url: format!("/pay/booking/{}", booking.id),
        requires_immediate_payment: quote.requires_immediate_payment,
        booking,
    })
}

/// Moves a booking to a new slot. Allowed only while more than the cutoff
/// remains before the current start, and only onto a free, future slot.
pub fn reschedule(
    conn: &Connection,
    rules: &BookingRules,
    now: DateTime<Utc>,
    booking_id: &str,
    new_date: Option<&str>,
    new_start_minutes: Option<i64>,
) -> Result<Booking, AppError> {
    let booking = queries::get_booking(conn, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;

    if booking.status == BookingStatus::Cancelled {
        return Err(AppError::InvalidState("booking is cancelled".to_string()));
    }

    let remaining = clock::minutes_until_start(now, booking.date, booking.start_minutes);
    if remaining <= rules.reschedule_cutoff_minutes {
        return Err(AppError::TooLate(format!(
            "rescheduling allowed only until {} minutes before start",
            rules.reschedule_cutoff_minutes
        )));
    }

    let target_date = match new_date {
        Some(d) => NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d")
            .map_err(|_| AppError::Validation("invalid date".to_string()))?,
        None => booking.date,
    };
    let target_start = new_start_minutes.unwrap_or(booking.start_minutes);
    if !(0..24 * 60).contains(&target_start) {
        return Err(AppError::Validation("invalid start time".to_string()));
    }

    if clock::minutes_until_start(now, target_date, target_start) <= 0 {
        return Err(AppError::PastTime(
            "cannot reschedule to a past time slot".to_string(),
        ));
    }

    if slots::has_conflict(
        conn,
        &booking.id,
        &booking.service_id,
        target_date,
        target_start,
        rules.capacity_per_slot,
    )? {
        return Err(AppError::SlotConflict(
            "selected slot is already booked".to_string(),
        ));
    }

    queries::update_booking_schedule(conn, &booking.id, target_date, target_start)?;
    tracing::info!(booking_id = %booking.id, date = %target_date, start_minutes = target_start, "booking rescheduled");

    queries::get_booking(conn, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))
}

/// Owner cancellation, bound by the same cutoff window as rescheduling.
pub fn cancel(
    conn: &Connection,
    rules: &BookingRules,
    now: DateTime<Utc>,
    booking_id: &str,
) -> Result<Booking, AppError> {
    let booking = queries::get_booking(conn, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;

    if booking.status == BookingStatus::Cancelled {
        return Err(AppError::InvalidState("booking is already cancelled".to_string()));
    }

    let remaining = clock::minutes_until_start(now, booking.date, booking.start_minutes);
    if remaining <= rules.reschedule_cutoff_minutes {
        return Err(AppError::TooLate(format!(
            "cancellation allowed only until {} minutes before start",
            rules.reschedule_cutoff_minutes
        )));
    }

    queries::update_booking_status(conn, &booking.id, BookingStatus::Cancelled)?;
    queries::set_order_status(conn, &booking.id, OrderStatus::Cancelled)?;
    tracing::info!(booking_id = %booking.id, "booking cancelled by owner");

    queries::get_booking(conn, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))
}

/// Admin completion flags. Orthogonal to status, except that a cancelled
/// booking accepts no further changes.
pub fn set_completion_flags(
    conn: &Connection,
    booking_id: &str,
    inspection_completed: Option<bool>,
    service_completed: Option<bool>,
) -> Result<Booking, AppError> {
    let booking = queries::get_booking(conn, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;

    if booking.status == BookingStatus::Cancelled {
        return Err(AppError::InvalidState(
            "cannot update a cancelled booking".to_string(),
        ));
    }

    queries::set_completion_flags(conn, booking_id, inspection_completed, service_completed)?;
    queries::get_booking(conn, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))
}

/// Post-inspection plan selection: the customer picks per-visit or monthly
/// maintenance, priced off the service base. The plan locks once a payment
/// has been verified against it.
pub fn select_plan(
    conn: &Connection,
    minimum_charge_paise: i64,
    booking_id: &str,
    plan_type: &str,
    monthly_day: Option<u32>,
) -> Result<Booking, AppError> {
    let booking = queries::get_booking(conn, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;

    if booking.status == BookingStatus::Cancelled {
        return Err(AppError::InvalidState(
            "cannot update a cancelled booking".to_string(),
        ));
    }
    if booking.amount_paid_paise > 0 {
        return Err(AppError::InvalidState(
            "plan is locked after a verified payment".to_string(),
        ));
    }

    let plan = match plan_type {
        "PER_VISIT" => PlanType::PerVisit,
        "MONTHLY" => PlanType::Monthly,
        _ => {
            return Err(AppError::Validation(
                "please select a valid plan".to_string(),
            ))
        }
    };

    let monthly_day = match (plan, monthly_day) {
        (PlanType::Monthly, Some(day)) if (1..=28).contains(&day) => Some(day),
        (PlanType::Monthly, Some(_)) => {
            return Err(AppError::Validation(
                "please choose a monthly payment date between 1 and 28".to_string(),
            ))
        }
        // Unset is allowed: the first successful payment anchors the day.
        (PlanType::Monthly, None) => None,
        _ => None,
    };

    let service = queries::get_service_by_id(conn, &booking.service_id)?
        .ok_or_else(|| AppError::NotFound(format!("service {}", booking.service_id)))?;
    let base = pricing::service_default_paise(&service, minimum_charge_paise);
    let price = pricing::maintenance_plan_paise(base, plan)?;

    queries::set_booking_plan(conn, booking_id, plan, price, monthly_day)?;
    queries::get_booking(conn, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))
}

fn valid_pincode(pin: &str) -> bool {
    pin.len() == 6
        && pin.chars().all(|c| c.is_ascii_digit())
        && !pin.starts_with('0')
}

fn pincode_allowed(pin: &str, allowed_prefixes: &[String]) -> bool {
    allowed_prefixes.is_empty() || allowed_prefixes.iter().any(|p| pin.starts_with(p.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::test_support::{rules, utc};

    fn setup() -> (Connection, Service) {
        let conn = db::init_db(":memory:").unwrap();
        let service = queries::get_service_by_slug(&conn, "kitchen-gardening")
            .unwrap()
            .unwrap();
        (conn, service)
    }

    fn request(date: &str, start: i64) -> CreateBookingRequest {
        CreateBookingRequest {
            date: date.to_string(),
            start_minutes: start,
            customer_name: "Asha Rao".to_string(),
            customer_phone: "+919812345678".to_string(),
            customer_email: None,
            address_line1: "14 Rose Lane".to_string(),
            address_line2: None,
            city: "Pune".to_string(),
            region: Some("Maharashtra".to_string()),
            postal_code: "411001".to_string(),
            notes: None,
            plan: pricing::PlanInputs {
                plan_type: Some("PER_VISIT".to_string()),
                veg_count: Some(4),
                ..Default::default()
            },
        }
    }

    // 2024-06-01 09:00 IST.
    fn now() -> DateTime<Utc> {
        utc("2024-06-01 03:30:00")
    }

    #[test]
    fn test_create_booking_happy_path() {
        let (conn, service) = setup();
        let outcome =
            create_booking(&conn, &rules(), now(), &service, "asha@example.com", &request("2024-06-05", 540))
                .unwrap();

        assert_eq!(outcome.booking.status, BookingStatus::Pending);
        assert_eq!(outcome.booking.plan_price_paise, 120_000);
        assert!(outcome.requires_immediate_payment);
        assert!(outcome.payment_handoff_url.contains(&outcome.booking.id));

        let order = queries::get_order(&conn, &outcome.booking.id).unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_paise, 120_000);
    }

    #[test]
    fn test_create_booking_rejects_bad_pincode() {
        let (conn, service) = setup();
        let mut req = request("2024-06-05", 540);
        req.postal_code = "04110".to_string();
        let err = create_booking(&conn, &rules(), now(), &service, "a@b.c", &req).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_create_booking_rejects_outside_service_area() {
        let (conn, service) = setup();
        let mut r = rules();
        r.allowed_pincode_prefixes = vec!["411".to_string()];
        let mut req = request("2024-06-05", 540);
        req.postal_code = "560001".to_string();
        let err = create_booking(&conn, &r, now(), &service, "a@b.c", &req).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_create_booking_rejects_past_slots() {
        let (conn, service) = setup();
        let err = create_booking(&conn, &rules(), now(), &service, "a@b.c", &request("2024-05-31", 540))
            .unwrap_err();
        assert!(matches!(err, AppError::PastTime(_)));

        // Same day, 09:00 already passed at 09:00 exactly.
        let err = create_booking(&conn, &rules(), now(), &service, "a@b.c", &request("2024-06-01", 540))
            .unwrap_err();
        assert!(matches!(err, AppError::PastTime(_)));
    }

    #[test]
    fn test_create_booking_respects_blackout_and_advance_limit() {
        let (conn, service) = setup();
        let mut r = rules();
        r.blackout_dates = vec!["2024-06-05".to_string()];
        let err = create_booking(&conn, &r, now(), &service, "a@b.c", &request("2024-06-05", 540))
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = create_booking(&conn, &rules(), now(), &service, "a@b.c", &request("2024-08-01", 540))
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_create_booking_full_slot() {
        let (conn, service) = setup();
        let outcome =
            create_booking(&conn, &rules(), now(), &service, "a@b.c", &request("2024-06-05", 540))
                .unwrap();
        queries::update_booking_status(&conn, &outcome.booking.id, BookingStatus::Confirmed)
            .unwrap();

        let err = create_booking(&conn, &rules(), now(), &service, "d@e.f", &request("2024-06-05", 540))
            .unwrap_err();
        assert!(matches!(err, AppError::CapacityExceeded(_)));

        // A pending booking alone does not block the slot.
        let outcome2 =
            create_booking(&conn, &rules(), now(), &service, "d@e.f", &request("2024-06-05", 660))
                .unwrap();
        assert_eq!(outcome2.booking.status, BookingStatus::Pending);
    }

    #[test]
    fn test_reschedule_window() {
        let (conn, service) = setup();
        let outcome =
            create_booking(&conn, &rules(), now(), &service, "a@b.c", &request("2024-06-05", 540))
                .unwrap();
        let id = outcome.booking.id.clone();

        // 59 minutes before start: 2024-06-05 08:01 IST = 02:31 UTC.
        let late = utc("2024-06-05 02:31:00");
        let err = reschedule(&conn, &rules(), late, &id, None, Some(660)).unwrap_err();
        assert!(matches!(err, AppError::TooLate(_)));

        // 61 minutes before start.
        let in_time = utc("2024-06-05 02:29:00");
        let updated = reschedule(&conn, &rules(), in_time, &id, None, Some(660)).unwrap();
        assert_eq!(updated.start_minutes, 660);
    }

    #[test]
    fn test_reschedule_rejects_conflict_and_past_target() {
        let (conn, service) = setup();
        let first =
            create_booking(&conn, &rules(), now(), &service, "a@b.c", &request("2024-06-05", 540))
                .unwrap();
        queries::update_booking_status(&conn, &first.booking.id, BookingStatus::Confirmed).unwrap();

        let second =
            create_booking(&conn, &rules(), now(), &service, "d@e.f", &request("2024-06-06", 540))
                .unwrap();

        let err = reschedule(&conn, &rules(), now(), &second.booking.id, Some("2024-06-05"), Some(540))
            .unwrap_err();
        assert!(matches!(err, AppError::SlotConflict(_)));

        let err = reschedule(&conn, &rules(), now(), &second.booking.id, Some("2024-05-20"), Some(540))
            .unwrap_err();
        assert!(matches!(err, AppError::PastTime(_)));
    }

    #[test]
    fn test_cancel_window_and_terminal_state() {
        let (conn, service) = setup();
        let outcome =
            create_booking(&conn, &rules(), now(), &service, "a@b.c", &request("2024-06-05", 540))
                .unwrap();
        let id = outcome.booking.id.clone();

        let cancelled = cancel(&conn, &rules(), now(), &id).unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        let order = queries::get_order(&conn, &id).unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);

        // Cancelling twice is an invalid transition.
        let err = cancel(&conn, &rules(), now(), &id).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[test]
    fn test_completion_flags_rejected_on_cancelled() {
        let (conn, service) = setup();
        let outcome =
            create_booking(&conn, &rules(), now(), &service, "a@b.c", &request("2024-06-05", 540))
                .unwrap();
        let id = outcome.booking.id.clone();

        let updated = set_completion_flags(&conn, &id, Some(true), None).unwrap();
        assert!(updated.inspection_completed);

        cancel(&conn, &rules(), now(), &id).unwrap();
        let err = set_completion_flags(&conn, &id, None, Some(true)).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[test]
    fn test_select_plan_prices_from_service_base() {
        let conn = db::init_db(":memory:").unwrap();
        let garden = queries::get_service_by_slug(&conn, "garden-services")
            .unwrap()
            .unwrap();
        let outcome = create_booking(
            &conn,
            &rules(),
            now(),
            &garden,
            "a@b.c",
            &CreateBookingRequest {
                plan: pricing::PlanInputs::default(),
                ..request("2024-06-05", 540)
            },
        )
        .unwrap();
        let id = outcome.booking.id.clone();
        assert_eq!(outcome.booking.plan_price_paise, 0);

        let updated = select_plan(&conn, 100, &id, "MONTHLY", Some(15)).unwrap();
        // 4 × ₹499 base.
        assert_eq!(updated.plan_price_paise, 4 * 49_900);
        assert_eq!(updated.monthly_day, Some(15));
    }
}
