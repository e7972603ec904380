//! Shared helpers for the unit tests.

use chrono::{DateTime, NaiveDateTime, Utc};
use hmac::{Hmac, Mac};
use rusqlite::{params, Connection};
use sha2::Sha256;

use crate::config::BookingRules;
use crate::models::BookingStatus;

pub fn rules() -> BookingRules {
    BookingRules {
        capacity_per_slot: 1,
        booking_max_days_advance: 30,
        same_day_cutoff_minutes: 18 * 60,
        reschedule_cutoff_minutes: 60,
        minimum_charge_paise: 100,
        blackout_dates: vec![],
        allowed_pincode_prefixes: vec![],
    }
}

pub fn utc(s: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .unwrap()
        .and_utc()
}

pub fn sign(secret: &str, order_id: &str, payment_id: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{order_id}|{payment_id}").as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub fn service_id_for(conn: &Connection, slug: &str) -> String {
    conn.query_row(
        "SELECT id FROM services WHERE slug = ?1",
        params![slug],
        |row| row.get(0),
    )
    .unwrap()
}

/// Minimal direct insert for ledger tests that do not need the full
/// booking-creation path.
pub fn insert_booking(
    conn: &Connection,
    id: &str,
    service_id: &str,
    date: &str,
    start_minutes: i64,
    status: BookingStatus,
) {
    conn.execute(
        "INSERT INTO bookings (id, service_id, date, start_minutes, duration_minutes,
            booking_type, status, plan_type, customer_name, customer_phone,
            address_line1, city, postal_code, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 120, 'MAINTENANCE', ?5, 'NONE', 'Test Customer',
            '+911234567890', '1 Test Road', 'Pune', '411001',
            '2024-01-01 00:00:00', '2024-01-01 00:00:00')",
        params![id, service_id, date, start_minutes, status.as_str()],
    )
    .unwrap();
}
