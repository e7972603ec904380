use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

pub const BOOKING_DURATION_MINUTES: i64 = 120;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub service_id: String,
    pub date: NaiveDate,
    pub start_minutes: i64,
    pub duration_minutes: i64,
    pub booking_type: BookingType,
    pub status: BookingStatus,
    pub plan_type: PlanType,
    pub plan_price_paise: i64,
    pub monthly_day: Option<u32>,
    pub inspection_completed: bool,
    pub service_completed: bool,
    pub gateway_order_id: Option<String>,
    pub amount_paid_paise: i64,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: Option<String>,
    pub address_line1: String,
    pub address_line2: Option<String>,
    pub city: String,
    pub region: Option<String>,
    pub postal_code: String,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Booking {
    /// Monthly billing anchor. Prefers the typed column; falls back to a
    /// legacy `monthlyDay=N` token in notes left by pre-migration data.
    pub fn monthly_day_resolved(&self) -> Option<u32> {
        if let Some(day) = self.monthly_day {
            return Some(day);
        }
        parse_notes_day(self.notes.as_deref()?)
    }

    pub fn has_first_payment_marker(&self) -> bool {
        self.notes
            .as_deref()
            .map(|n| n.contains("firstPaymentDate="))
            .unwrap_or(false)
    }
}

/// Scans notes for a `monthlyDay=N` token (1..=28). Migration shim for rows
/// created before the column existed.
fn parse_notes_day(notes: &str) -> Option<u32> {
    let idx = notes.find("monthlyDay")?;
    let rest = notes[idx + "monthlyDay".len()..].trim_start();
    let rest = rest.strip_prefix('=')?.trim_start();
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    let day: u32 = digits.parse().ok()?;
    if (1..=28).contains(&day) {
        Some(day)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "CONFIRMED" => BookingStatus::Confirmed,
            "CANCELLED" => BookingStatus::Cancelled,
            _ => BookingStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum BookingType {
    Inspection,
    Maintenance,
}

impl BookingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingType::Inspection => "INSPECTION",
            BookingType::Maintenance => "MAINTENANCE",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "INSPECTION" => BookingType::Inspection,
            _ => BookingType::Maintenance,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanType {
    None,
    PerVisit,
    Monthly,
}

impl PlanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::None => "NONE",
            PlanType::PerVisit => "PER_VISIT",
            PlanType::Monthly => "MONTHLY",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "PER_VISIT" => PlanType::PerVisit,
            "MONTHLY" => PlanType::Monthly,
            _ => PlanType::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_notes_day() {
        assert_eq!(parse_notes_day("KG: plan=MONTHLY; monthlyDay=15; "), Some(15));
        assert_eq!(parse_notes_day("monthlyDay = 7"), Some(7));
        assert_eq!(parse_notes_day("monthlyDay=31"), None);
        assert_eq!(parse_notes_day("monthlyDay=0"), None);
        assert_eq!(parse_notes_day("no token here"), None);
    }

    #[test]
    fn test_plan_type_round_trip() {
        for s in ["NONE", "PER_VISIT", "MONTHLY"] {
            assert_eq!(PlanType::from_str(s).as_str(), s);
        }
        assert_eq!(PlanType::from_str("garbage"), PlanType::None);
    }
}
