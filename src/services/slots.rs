use chrono::NaiveDate;
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::AppError;

/// Ledger of confirmed slot occupancy. PENDING bookings never block a slot;
/// a completed payment is the reservation signal. Every read here runs on
/// the caller's connection so it can share a transaction with the write
/// that depends on it.
pub fn count_confirmed(
    conn: &Connection,
    service_id: &str,
    date: NaiveDate,
    start_minutes: i64,
) -> Result<i64, AppError> {
    Ok(queries::count_confirmed_at_slot(conn, service_id, date, start_minutes, None)?)
}

/// True when a CONFIRMED booking other than `exclude_booking_id` already
/// holds the slot at capacity. Used when re-validating a reschedule target
/// and inside the payment reconciliation.
pub fn has_conflict(
    conn: &Connection,
    exclude_booking_id: &str,
    service_id: &str,
    date: NaiveDate,
    start_minutes: i64,
    capacity_per_slot: i64,
) -> Result<bool, AppError> {
    let count = queries::count_confirmed_at_slot(
        conn,
        service_id,
        date,
        start_minutes,
        Some(exclude_booking_id),
    )?;
    Ok(count >= capacity_per_slot)
}

pub fn is_full(
    conn: &Connection,
    service_id: &str,
    date: NaiveDate,
    start_minutes: i64,
    capacity_per_slot: i64,
) -> Result<bool, AppError> {
    Ok(count_confirmed(conn, service_id, date, start_minutes)? >= capacity_per_slot)
}

/// Start times already at capacity for a service/date, for availability
/// views. The caller owns the grid of offered start times.
pub fn booked_start_minutes(
    conn: &Connection,
    service_id: &str,
    date: NaiveDate,
    capacity_per_slot: i64,
) -> Result<Vec<i64>, AppError> {
    let counts = queries::confirmed_counts_for_date(conn, service_id, date)?;
    Ok(counts
        .into_iter()
        .filter(|(_, count)| *count >= capacity_per_slot)
        .map(|(start, _)| start)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::test_support::{insert_booking, service_id_for};
    use crate::models::BookingStatus;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_pending_bookings_never_block() {
        let conn = db::init_db(":memory:").unwrap();
        let sid = service_id_for(&conn, "kitchen-gardening");

        insert_booking(&conn, "b1", &sid, "2024-06-01", 540, BookingStatus::Pending);
        insert_booking(&conn, "b2", &sid, "2024-06-01", 540, BookingStatus::Pending);

        assert_eq!(count_confirmed(&conn, &sid, date("2024-06-01"), 540).unwrap(), 0);
        assert!(!is_full(&conn, &sid, date("2024-06-01"), 540, 1).unwrap());
    }

    #[test]
    fn test_confirmed_fills_slot() {
        let conn = db::init_db(":memory:").unwrap();
        let sid = service_id_for(&conn, "kitchen-gardening");

        insert_booking(&conn, "b1", &sid, "2024-06-01", 540, BookingStatus::Confirmed);

        assert!(is_full(&conn, &sid, date("2024-06-01"), 540, 1).unwrap());
        assert!(!is_full(&conn, &sid, date("2024-06-01"), 540, 2).unwrap());
        // A different start time is unaffected.
        assert!(!is_full(&conn, &sid, date("2024-06-01"), 660, 1).unwrap());
    }

    #[test]
    fn test_conflict_excludes_self() {
        let conn = db::init_db(":memory:").unwrap();
        let sid = service_id_for(&conn, "kitchen-gardening");

        insert_booking(&conn, "mine", &sid, "2024-06-01", 540, BookingStatus::Confirmed);

        // The booking under consideration does not conflict with itself.
        assert!(!has_conflict(&conn, "mine", &sid, date("2024-06-01"), 540, 1).unwrap());

        insert_booking(&conn, "other", &sid, "2024-06-01", 540, BookingStatus::Confirmed);
        assert!(has_conflict(&conn, "mine", &sid, date("2024-06-01"), 540, 1).unwrap());
    }

    #[test]
    fn test_booked_start_minutes() {
        let conn = db::init_db(":memory:").unwrap();
        let sid = service_id_for(&conn, "kitchen-gardening");

        insert_booking(&conn, "b1", &sid, "2024-06-01", 540, BookingStatus::Confirmed);
        insert_booking(&conn, "b2", &sid, "2024-06-01", 660, BookingStatus::Pending);

        let booked = booked_start_minutes(&conn, &sid, date("2024-06-01"), 1).unwrap();
        assert_eq!(booked, vec![540]);
    }
}
