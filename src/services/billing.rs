use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rusqlite::Connection;
use serde::Serialize;

use crate::config::BookingRules;
use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, BookingStatus, BookingType, PlanType};
use crate::services::{clock, pricing};

/// A monthly plan is payable on its anchored day-of-month; an unanchored
/// plan (no day chosen, no payment yet) is payable any day.
pub fn is_payable_today(monthly_day: Option<u32>, today_day: u32) -> bool {
    match monthly_day {
        Some(day) => day == today_day,
        None => true,
    }
}

/// Days until the next occurrence of `monthly_day` (0 when due today).
/// Days are restricted to 1..=28 so every month has the target date.
pub fn days_until_monthly_day(today: NaiveDate, monthly_day: u32) -> i64 {
    let target = if today.day() <= monthly_day {
        NaiveDate::from_ymd_opt(today.year(), today.month(), monthly_day)
    } else if today.month() == 12 {
        NaiveDate::from_ymd_opt(today.year() + 1, 1, monthly_day)
    } else {
        NaiveDate::from_ymd_opt(today.year(), today.month() + 1, monthly_day)
    };
    target.map(|t| (t - today).num_days()).unwrap_or(0)
}

/// Decides whether a booking can take a payment right now and for how much.
/// Inspection bookings gate on the completed-inspection flag and a chosen
/// plan; monthly plans gate on the anchored day.
pub fn payable_amount(
    conn: &Connection,
    rules: &BookingRules,
    now: DateTime<Utc>,
    booking: &Booking,
) -> Result<i64, AppError> {
    if booking.status == BookingStatus::Cancelled {
        return Err(AppError::InvalidState("booking is cancelled".to_string()));
    }

    let service = queries::get_service_by_id(conn, &booking.service_id)?
        .ok_or_else(|| AppError::NotFound(format!("service {}", booking.service_id)))?;

    let today_day = clock::day_of_month(now);

    match booking.booking_type {
        BookingType::Inspection => {
            if !booking.inspection_completed {
                return Err(AppError::Validation(
                    "inspection pending; no payment required yet".to_string(),
                ));
            }
            if booking.plan_type == PlanType::None || booking.plan_price_paise <= 0 {
                return Err(AppError::Validation(
                    "please select a plan to proceed with payment".to_string(),
                ));
            }
            if booking.plan_type == PlanType::Monthly
                && !is_payable_today(booking.monthly_day_resolved(), today_day)
            {
                return Err(AppError::Validation(
                    "payment is not due today for this monthly plan".to_string(),
                ));
            }
            Ok(booking.plan_price_paise)
        }
        BookingType::Maintenance => {
            if booking.plan_type != PlanType::None && booking.plan_price_paise > 0 {
                if booking.plan_type == PlanType::Monthly
                    && !is_payable_today(booking.monthly_day_resolved(), today_day)
                {
                    return Err(AppError::Validation(
                        "payment is not due today for this monthly plan".to_string(),
                    ));
                }
                Ok(booking.plan_price_paise)
            } else {
                Ok(pricing::service_default_paise(&service, rules.minimum_charge_paise))
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Reminder {
    pub booking_id: String,
    pub service_name: String,
    pub monthly_day: Option<u32>,
    pub days_until_due: Option<i64>,
    /// No anchor yet: the first payment can be made any day.
    pub payable_any_day: bool,
}

const REMINDER_WINDOW_DAYS: i64 = 5;

/// Payment reminders for a customer's active monthly plans: anchored plans
/// due within the window, plus unanchored plans awaiting a first payment.
pub fn monthly_reminders(
    conn: &Connection,
    email: &str,
    now: DateTime<Utc>,
) -> Result<Vec<Reminder>, AppError> {
    let today = clock::today(now);
    let bookings = queries::monthly_bookings_for_email(conn, email)?;

    let mut reminders = vec![];
    for booking in bookings {
        let service_name = queries::get_service_by_id(conn, &booking.service_id)?
            .map(|s| s.name)
            .unwrap_or_default();

        match booking.monthly_day_resolved() {
            Some(day) => {
                let days = days_until_monthly_day(today, day);
                if (0..=REMINDER_WINDOW_DAYS).contains(&days) {
                    reminders.push(Reminder {
                        booking_id: booking.id.clone(),
                        service_name,
                        monthly_day: Some(day),
                        days_until_due: Some(days),
                        payable_any_day: false,
                    });
                }
            }
            None => {
                // First month: surface the booked slot date when it is near.
                let days_to_slot = (booking.date - today).num_days();
                reminders.push(Reminder {
                    booking_id: booking.id.clone(),
                    service_name,
                    monthly_day: None,
                    days_until_due: (0..=REMINDER_WINDOW_DAYS)
                        .contains(&days_to_slot)
                        .then_some(days_to_slot),
                    payable_any_day: true,
                });
            }
        }
    }
    Ok(reminders)
}
