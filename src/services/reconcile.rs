use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rusqlite::Connection;
use serde::Deserialize;
use sha2::Sha256;

use crate::config::BookingRules;
use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, BookingStatus, BookingType, OrderStatus, PlanType};
use crate::services::{clock, pricing, slots};

/// Gateway callback payload: the order we issued, the gateway's payment id,
/// and an HMAC binding the two.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentCallback {
    #[serde(alias = "orderId")]
    pub gateway_order_id: String,
    #[serde(alias = "paymentId")]
    pub gateway_payment_id: String,
    pub signature: String,
}

/// HMAC-SHA256 over `orderId|paymentId`, hex-encoded, per the gateway's
/// signing contract.
pub fn verify_signature(secret: &str, order_id: &str, payment_id: &str, signature: &str) -> bool {
    let mut mac = match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(format!("{order_id}|{payment_id}").as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());
    expected == signature
}

/// Atomically reconciles a completed gateway payment against the booking
/// and the slot ledger. Exactly one of two outcomes: the booking ends
/// CONFIRMED with its order projection PAID, or it ends CANCELLED and the
/// caller gets the error explaining why.
pub fn verify_and_confirm(
    conn: &mut Connection,
    rules: &BookingRules,
    gateway_secret: &str,
    now: DateTime<Utc>,
    callback: &PaymentCallback,
) -> Result<Booking, AppError> {
    if !verify_signature(
        gateway_secret,
        &callback.gateway_order_id,
        &callback.gateway_payment_id,
        &callback.signature,
    ) {
        tracing::warn!(order_id = %callback.gateway_order_id, "invalid payment signature");
        queries::cancel_bookings_by_gateway_order(conn, &callback.gateway_order_id)?;
        return Err(AppError::Signature);
    }

    let tx = conn.transaction()?;

    let booking = queries::get_booking_by_gateway_order(&tx, &callback.gateway_order_id)?
        .ok_or_else(|| {
            AppError::NotFound(format!("booking for order {}", callback.gateway_order_id))
        })?;
    let service = queries::get_service_by_id(&tx, &booking.service_id)?
        .ok_or_else(|| AppError::NotFound(format!("service {}", booking.service_id)))?;

    // Same rule that priced the order when it was created.
    let amount_paise = match booking.booking_type {
        BookingType::Inspection => booking.plan_price_paise,
        BookingType::Maintenance => {
            if booking.plan_price_paise > 0 {
                booking.plan_price_paise
            } else {
                pricing::service_default_paise(&service, rules.minimum_charge_paise)
            }
        }
    };

    // Re-check the ledger inside the transaction: first committer wins,
    // the loser is cancelled so the customer can be informed and refunded.
    if slots::has_conflict(
        &tx,
        &booking.id,
        &booking.service_id,
        booking.date,
        booking.start_minutes,
        rules.capacity_per_slot,
    )? {
        queries::update_booking_status(&tx, &booking.id, BookingStatus::Cancelled)?;
        queries::set_order_status(&tx, &booking.id, OrderStatus::Cancelled)?;
        tx.commit()?;
        tracing::warn!(booking_id = %booking.id, "slot lost to a concurrent payment; booking cancelled");
        return Err(AppError::SlotConflict("slot already taken".to_string()));
    }

    // Anchor the monthly day from the first successful payment when the
    // customer never chose one. Explicit choices are never overwritten.
    let should_anchor =
        booking.plan_type == PlanType::Monthly && booking.monthly_day_resolved().is_none();
    let anchor_day = should_anchor.then(|| clock::day_of_month(now));
    let notes = if should_anchor && !booking.has_first_payment_marker() {
        let marker = format!("firstPaymentDate={}", clock::today(now).format("%Y-%m-%d"));
        Some(match booking.notes.as_deref() {
            Some(n) if !n.is_empty() => format!("{n}\n{marker}"),
            _ => marker,
        })
    } else {
        None
    };

    queries::confirm_booking_paid(&tx, &booking.id, amount_paise, anchor_day, notes.as_deref())?;

    let payment_details = serde_json::json!({
        "type": "service",
        "serviceName": service.name,
        "date": booking.date.format("%Y-%m-%d").to_string(),
        "startMinutes": booking.start_minutes,
        "bookingId": booking.id,
    });
    queries::upsert_order_paid(
        &tx,
        &booking,
        amount_paise,
        &callback.gateway_payment_id,
        &payment_details,
    )?;

    tx.commit()?;

    tracing::info!(
        booking_id = %booking.id,
        amount_paise,
        payment_id = %callback.gateway_payment_id,
        "payment reconciled; booking confirmed"
    );

    queries::get_booking(conn, &booking.id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {}", booking.id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::Service;
    use crate::services::lifecycle::{self, CreateBookingRequest};
    use crate::test_support::{rules, sign, utc};

    const SECRET: &str = "test-secret";

    fn setup() -> (Connection, Service) {
        let conn = db::init_db(":memory:").unwrap();
        let service = queries::get_service_by_slug(&conn, "kitchen-gardening")
            .unwrap()
            .unwrap();
        (conn, service)
    }

    fn now() -> DateTime<Utc> {
        utc("2024-06-01 03:30:00")
    }

    fn make_booking(conn: &Connection, service: &Service, email: &str, order_id: &str) -> String {
        let req = CreateBookingRequest {
            date: "2024-06-05".to_string(),
            start_minutes: 540,
            customer_name: "Asha Rao".to_string(),
            customer_phone: "+919812345678".to_string(),
            customer_email: None,
            address_line1: "14 Rose Lane".to_string(),
            address_line2: None,
            city: "Pune".to_string(),
            region: None,
            postal_code: "411001".to_string(),
            notes: None,
            plan: crate::services::pricing::PlanInputs {
                plan_type: Some("PER_VISIT".to_string()),
                veg_count: Some(4),
                ..Default::default()
            },
        };
        let outcome = lifecycle::create_booking(conn, &rules(), now(), service, email, &req).unwrap();
        queries::set_gateway_order_id(conn, &outcome.booking.id, order_id).unwrap();
        outcome.booking.id
    }

    fn callback(order_id: &str, payment_id: &str) -> PaymentCallback {
        PaymentCallback {
            gateway_order_id: order_id.to_string(),
            gateway_payment_id: payment_id.to_string(),
            signature: sign(SECRET, order_id, payment_id),
        }
    }

    #[test]
    fn test_signature_round_trip() {
        let sig = sign(SECRET, "order_1", "pay_1");
        assert!(verify_signature(SECRET, "order_1", "pay_1", &sig));
        assert!(!verify_signature(SECRET, "order_1", "pay_2", &sig));
        assert!(!verify_signature("other-secret", "order_1", "pay_1", &sig));
    }

    #[test]
    fn test_confirms_and_marks_order_paid() {
        let (mut conn, service) = setup();
        let id = make_booking(&conn, &service, "asha@example.com", "order_1");

        let confirmed =
            verify_and_confirm(&mut conn, &rules(), SECRET, now(), &callback("order_1", "pay_1"))
                .unwrap();
        assert_eq!(confirmed.status, BookingStatus::Confirmed);
        assert_eq!(confirmed.amount_paid_paise, 120_000);

        let order = queries::get_order(&conn, &id).unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
        assert_eq!(order.total_paise, 120_000);
        assert_eq!(order.gateway_payment_id.as_deref(), Some("pay_1"));
    }

    #[test]
    fn test_bad_signature_cancels_booking() {
        let (mut conn, service) = setup();
        let id = make_booking(&conn, &service, "asha@example.com", "order_1");

        let cb = PaymentCallback {
            gateway_order_id: "order_1".to_string(),
            gateway_payment_id: "pay_1".to_string(),
            signature: "deadbeef".to_string(),
        };
        let err = verify_and_confirm(&mut conn, &rules(), SECRET, now(), &cb).unwrap_err();
        assert!(matches!(err, AppError::Signature));

        let booking = queries::get_booking(&conn, &id).unwrap().unwrap();
        assert_eq!(booking.status, BookingStatus::Cancelled);
        let order = queries::get_order(&conn, &id).unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
    }

    #[test]
    fn test_unknown_order_id() {
        let (mut conn, _) = setup();
        let err = verify_and_confirm(&mut conn, &rules(), SECRET, now(), &callback("order_x", "pay_1"))
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn test_slot_race_first_committer_wins() {
        let (mut conn, service) = setup();
        let id_a = make_booking(&conn, &service, "a@example.com", "order_a");
        let id_b = make_booking(&conn, &service, "b@example.com", "order_b");

        let a = verify_and_confirm(&mut conn, &rules(), SECRET, now(), &callback("order_a", "pay_a"))
            .unwrap();
        assert_eq!(a.status, BookingStatus::Confirmed);

        let err = verify_and_confirm(&mut conn, &rules(), SECRET, now(), &callback("order_b", "pay_b"))
            .unwrap_err();
        assert!(matches!(err, AppError::SlotConflict(_)));

        let b = queries::get_booking(&conn, &id_b).unwrap().unwrap();
        assert_eq!(b.status, BookingStatus::Cancelled);
        // Loser's order never reaches PAID.
        let order_b = queries::get_order(&conn, &id_b).unwrap().unwrap();
        assert_eq!(order_b.status, OrderStatus::Cancelled);
        let order_a = queries::get_order(&conn, &id_a).unwrap().unwrap();
        assert_eq!(order_a.status, OrderStatus::Paid);
    }

    #[test]
    fn test_capacity_two_allows_both() {
        let (mut conn, service) = setup();
        make_booking(&conn, &service, "a@example.com", "order_a");
        make_booking(&conn, &service, "b@example.com", "order_b");

        let mut r = rules();
        r.capacity_per_slot = 2;
        let a = verify_and_confirm(&mut conn, &r, SECRET, now(), &callback("order_a", "pay_a"))
            .unwrap();
        let b = verify_and_confirm(&mut conn, &r, SECRET, now(), &callback("order_b", "pay_b"))
            .unwrap();
        assert_eq!(a.status, BookingStatus::Confirmed);
        assert_eq!(b.status, BookingStatus::Confirmed);
    }

    #[test]
    fn test_idempotent_redelivery() {
        let (mut conn, service) = setup();
        let id = make_booking(&conn, &service, "asha@example.com", "order_1");

        verify_and_confirm(&mut conn, &rules(), SECRET, now(), &callback("order_1", "pay_1"))
            .unwrap();
        let again =
            verify_and_confirm(&mut conn, &rules(), SECRET, now(), &callback("order_1", "pay_1"))
                .unwrap();
        assert_eq!(again.status, BookingStatus::Confirmed);
        assert_eq!(again.amount_paid_paise, 120_000);

        let order = queries::get_order(&conn, &id).unwrap().unwrap();
        assert_eq!(order.total_paise, 120_000);
    }

    #[test]
    fn test_monthly_day_anchored_once() {
        let (mut conn, service) = setup();
        let id = make_booking(&conn, &service, "asha@example.com", "order_1");
        // Monthly plan with no chosen day.
        queries::set_booking_plan(&conn, &id, PlanType::Monthly, 120_000, None).unwrap();

        let confirmed =
            verify_and_confirm(&mut conn, &rules(), SECRET, now(), &callback("order_1", "pay_1"))
                .unwrap();
        // Anchored to the IST day of payment (2024-06-01).
        assert_eq!(confirmed.monthly_day, Some(1));
        assert!(confirmed.has_first_payment_marker());

        // A later reconciliation on another day must not move the anchor.
        let later = utc("2024-06-15 03:30:00");
        let again =
            verify_and_confirm(&mut conn, &rules(), SECRET, later, &callback("order_1", "pay_2"))
                .unwrap();
        assert_eq!(again.monthly_day, Some(1));
        let markers = again
            .notes
            .as_deref()
            .unwrap()
            .matches("firstPaymentDate=")
            .count();
        assert_eq!(markers, 1);
    }

    #[test]
    fn test_concurrent_reconciliations_respect_capacity() {
        use std::sync::{Arc, Mutex};

        let (conn, service) = setup();
        let order_ids = ["order_a", "order_b", "order_c"];
        for (i, order_id) in order_ids.iter().enumerate() {
            let req = CreateBookingRequest {
                date: "2024-06-05".to_string(),
                start_minutes: 540,
                customer_name: format!("Customer {i}"),
                customer_phone: "+919812345678".to_string(),
                customer_email: None,
                address_line1: "14 Rose Lane".to_string(),
                address_line2: None,
                city: "Pune".to_string(),
                region: None,
                postal_code: "411001".to_string(),
                notes: None,
                plan: crate::services::pricing::PlanInputs {
                    plan_type: Some("PER_VISIT".to_string()),
                    veg_count: Some(4),
                    ..Default::default()
                },
            };
            let outcome = lifecycle::create_booking(
                &conn,
                &rules(),
                now(),
                &service,
                &format!("c{i}@example.com"),
                &req,
            )
            .unwrap();
            queries::set_gateway_order_id(&conn, &outcome.booking.id, order_id).unwrap();
        }

        let db = Arc::new(Mutex::new(conn));
        let handles: Vec<_> = order_ids
            .iter()
            .map(|order_id| {
                let db = Arc::clone(&db);
                let order_id = order_id.to_string();
                std::thread::spawn(move || {
                    let cb = PaymentCallback {
                        gateway_payment_id: format!("pay_{order_id}"),
                        signature: sign(SECRET, &order_id, &format!("pay_{order_id}")),
                        gateway_order_id: order_id,
                    };
                    let mut conn = db.lock().unwrap();
                    verify_and_confirm(&mut conn, &rules(), SECRET, now(), &cb).is_ok()
                })
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(wins, 1);

        let conn = db.lock().unwrap();
        let confirmed: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM bookings WHERE status = 'CONFIRMED'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(confirmed, 1);
    }

    #[test]
    fn test_explicit_monthly_day_not_overwritten() {
        let (mut conn, service) = setup();
        let id = make_booking(&conn, &service, "asha@example.com", "order_1");
        queries::set_booking_plan(&conn, &id, PlanType::Monthly, 120_000, Some(15)).unwrap();

        let confirmed =
            verify_and_confirm(&mut conn, &rules(), SECRET, now(), &callback("order_1", "pay_1"))
                .unwrap();
        assert_eq!(confirmed.monthly_day, Some(15));
        assert!(!confirmed.has_first_payment_marker());
    }
}
