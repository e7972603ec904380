use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, Timelike, Utc};

/// All civil dates and day-of-month decisions use India Standard Time.
const IST_OFFSET_SECONDS: i32 = 5 * 3600 + 30 * 60;

fn ist() -> FixedOffset {
    FixedOffset::east_opt(IST_OFFSET_SECONDS).expect("IST offset is valid")
}

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Civil "today" in IST.
pub fn today(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&ist()).date_naive()
}

/// Minutes elapsed since IST midnight.
pub fn minutes_of_day(now: DateTime<Utc>) -> i64 {
    let local = now.with_timezone(&ist());
    (local.hour() * 60 + local.minute()) as i64
}

/// IST day-of-month, the unit monthly billing anchors to.
pub fn day_of_month(now: DateTime<Utc>) -> u32 {
    now.with_timezone(&ist()).day()
}

/// The civil start instant of a slot as an IST-naive datetime.
pub fn slot_start(date: NaiveDate, start_minutes: i64) -> NaiveDateTime {
    date.and_hms_opt(0, 0, 0)
        .map(|midnight| midnight + Duration::minutes(start_minutes))
        .unwrap_or_else(|| date.and_time(chrono::NaiveTime::MIN))
}

/// Minutes from "now" until a slot's start; negative once the slot began.
pub fn minutes_until_start(now: DateTime<Utc>, date: NaiveDate, start_minutes: i64) -> i64 {
    let local_now = now.with_timezone(&ist()).naive_local();
    (slot_start(date, start_minutes) - local_now).num_minutes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
            .unwrap()
            .and_utc()
    }

    #[test]
    fn test_ist_rolls_the_date_forward() {
        // 20:00 UTC is 01:30 IST the next day.
        let now = utc("2024-06-01 20:00:00");
        assert_eq!(today(now), NaiveDate::from_ymd_opt(2024, 6, 2).unwrap());
        assert_eq!(minutes_of_day(now), 90);
        assert_eq!(day_of_month(now), 2);
    }

    #[test]
    fn test_minutes_until_start() {
        // 2024-06-01 09:00 IST is 03:30 UTC.
        let now = utc("2024-06-01 03:30:00");
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert_eq!(minutes_until_start(now, date, 540), 0);
        assert_eq!(minutes_until_start(now, date, 600), 60);
        assert_eq!(minutes_until_start(now, date, 480), -60);
    }
}
