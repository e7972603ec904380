use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    pub razorpay_key_id: String,
    pub razorpay_key_secret: String,
    pub bookings: BookingRules,
}

/// Booking policy knobs. Read once at startup and passed into core
/// operations; the core never reaches for ambient settings.
#[derive(Clone, Debug)]
pub struct BookingRules {
    pub capacity_per_slot: i64,
    pub booking_max_days_advance: i64,
    pub same_day_cutoff_minutes: i64,
    pub reschedule_cutoff_minutes: i64,
    pub minimum_charge_paise: i64,
    /// `YYYY-MM-DD` dates on which no bookings are accepted.
    pub blackout_dates: Vec<String>,
    /// Pincode prefixes inside the service area. Empty means no restriction.
    pub allowed_pincode_prefixes: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "greenthumb.db".to_string()),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_else(|_| "changeme".to_string()),
            razorpay_key_id: env::var("RAZORPAY_KEY_ID").unwrap_or_default(),
            razorpay_key_secret: env::var("RAZORPAY_KEY_SECRET").unwrap_or_default(),
            bookings: BookingRules {
                capacity_per_slot: env_i64("CAPACITY_PER_SLOT", 1).max(1),
                booking_max_days_advance: env_i64("BOOKING_MAX_DAYS_ADVANCE", 30),
                same_day_cutoff_minutes: env_i64("SAME_DAY_CUTOFF_MINUTES", 18 * 60),
                reschedule_cutoff_minutes: env_i64("RESCHEDULE_CUTOFF_MINUTES", 60),
                minimum_charge_paise: env_i64("MINIMUM_CHARGE_PAISE", 100),
                blackout_dates: env_list("BLACKOUT_DATES"),
                allowed_pincode_prefixes: env_list("ALLOWED_PINCODE_PREFIXES"),
            },
        }
    }
}

fn env_i64(key: &str, default: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_list(key: &str) -> Vec<String> {
    env::var(key)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
