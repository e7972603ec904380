use chrono::{NaiveDate, NaiveDateTime, Utc};
use rusqlite::{params, Connection};

use crate::models::{
    Booking, BookingStatus, Order, OrderStatus, PlanType, Service, User,
};

const BOOKING_COLUMNS: &str = "id, service_id, date, start_minutes, duration_minutes, booking_type, \
     status, plan_type, plan_price_paise, monthly_day, inspection_completed, service_completed, \
     gateway_order_id, amount_paid_paise, customer_name, customer_phone, customer_email, \
     address_line1, address_line2, city, region, postal_code, notes, created_at, updated_at";

const ORDER_COLUMNS: &str = "id, customer, email, phone, address, city, pincode, total_paise, \
     status, gateway_payment_id, payment_method, payment_details, created_at, updated_at";

fn now_str() -> String {
    Utc::now().naive_utc().format("%Y-%m-%d %H:%M:%S").to_string()
}

// ── Services ──

fn parse_service_row(row: &rusqlite::Row) -> anyhow::Result<Service> {
    let category: String = row.get(4)?;
    Ok(Service {
        id: row.get(0)?,
        slug: row.get(1)?,
        name: row.get(2)?,
        price_min: row.get(3)?,
        category: crate::models::ServiceCategory::from_str(&category),
    })
}

pub fn get_service_by_slug(conn: &Connection, slug: &str) -> anyhow::Result<Option<Service>> {
    let result = conn.query_row(
        "SELECT id, slug, name, price_min, category FROM services WHERE slug = ?1",
        params![slug],
        |row| Ok(parse_service_row(row)),
    );

    match result {
        Ok(service) => Ok(Some(service?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_service_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Service>> {
    let result = conn.query_row(
        "SELECT id, slug, name, price_min, category FROM services WHERE id = ?1",
        params![id],
        |row| Ok(parse_service_row(row)),
    );

    match result {
        Ok(service) => Ok(Some(service?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_services(conn: &Connection) -> anyhow::Result<Vec<Service>> {
    let mut stmt =
        conn.prepare("SELECT id, slug, name, price_min, category FROM services ORDER BY name ASC")?;
    let rows = stmt.query_map([], |row| Ok(parse_service_row(row)))?;

    let mut services = vec![];
    for row in rows {
        services.push(row??);
    }
    Ok(services)
}

// ── Bookings ──

pub fn create_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    conn.execute(
        &format!("INSERT INTO bookings ({BOOKING_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25)"),
        params![
            booking.id,
            booking.service_id,
            booking.date.format("%Y-%m-%d").to_string(),
            booking.start_minutes,
            booking.duration_minutes,
            booking.booking_type.as_str(),
            booking.status.as_str(),
            booking.plan_type.as_str(),
            booking.plan_price_paise,
            booking.monthly_day,
            booking.inspection_completed as i32,
            booking.service_completed as i32,
            booking.gateway_order_id,
            booking.amount_paid_paise,
            booking.customer_name,
            booking.customer_phone,
            booking.customer_email,
            booking.address_line1,
            booking.address_line2,
            booking.city,
            booking.region,
            booking.postal_code,
            booking.notes,
            booking.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            booking.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ],
    )?;
    Ok(())
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let date_str: String = row.get(2)?;
    let booking_type: String = row.get(5)?;
    let status: String = row.get(6)?;
    let plan_type: String = row.get(7)?;
    let created_at_str: String = row.get(23)?;
    let updated_at_str: String = row.get(24)?;

    let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
        .unwrap_or_else(|_| Utc::now().date_naive());
    let created_at = NaiveDateTime::parse_from_str(&created_at_str, "%Y-%m-%d %H:%M:%S")
        .unwrap_or_else(|_| Utc::now().naive_utc());
    let updated_at = NaiveDateTime::parse_from_str(&updated_at_str, "%Y-%m-%d %H:%M:%S")
        .unwrap_or_else(|_| Utc::now().naive_utc());

    Ok(Booking {
        id: row.get(0)?,
        service_id: row.get(1)?,
        date,
        start_minutes: row.get(3)?,
        duration_minutes: row.get(4)?,
        booking_type: crate::models::BookingType::from_str(&booking_type),
        status: BookingStatus::from_str(&status),
        plan_type: PlanType::from_str(&plan_type),
        plan_price_paise: row.get(8)?,
        monthly_day: row.get(9)?,
        inspection_completed: row.get::<_, i32>(10)? != 0,
        service_completed: row.get::<_, i32>(11)? != 0,
        gateway_order_id: row.get(12)?,
        amount_paid_paise: row.get(13)?,
        customer_name: row.get(14)?,
        customer_phone: row.get(15)?,
        customer_email: row.get(16)?,
        address_line1: row.get(17)?,
        address_line2: row.get(18)?,
        city: row.get(19)?,
        region: row.get(20)?,
        postal_code: row.get(21)?,
        notes: row.get(22)?,
        created_at,
        updated_at,
    })
}

pub fn get_booking(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn.query_row(
        &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
        params![id],
        |row| Ok(parse_booking_row(row)),
    );

    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_booking_by_gateway_order(
    conn: &Connection,
    gateway_order_id: &str,
) -> anyhow::Result<Option<Booking>> {
    let result = conn.query_row(
        &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE gateway_order_id = ?1"),
        params![gateway_order_id],
        |row| Ok(parse_booking_row(row)),
    );

    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_all_bookings(
    conn: &Connection,
    status_filter: Option<&str>,
    limit: i64,
) -> anyhow::Result<Vec<Booking>> {
    let (sql, params_vec): (String, Vec<Box<dyn rusqlite::types::ToSql>>) = match status_filter {
        Some(status) => (
            format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings WHERE status = ?1 \
                 ORDER BY date DESC, start_minutes DESC LIMIT ?2"
            ),
            vec![
                Box::new(status.to_string()) as Box<dyn rusqlite::types::ToSql>,
                Box::new(limit),
            ],
        ),
        None => (
            format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings \
                 ORDER BY date DESC, start_minutes DESC LIMIT ?1"
            ),
            vec![Box::new(limit) as Box<dyn rusqlite::types::ToSql>],
        ),
    };

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

/// Active monthly-plan bookings for a customer, used by payment reminders.
pub fn monthly_bookings_for_email(conn: &Connection, email: &str) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings \
         WHERE customer_email = ?1 AND plan_type = 'MONTHLY' \
           AND service_completed = 0 AND status != 'CANCELLED' \
         ORDER BY date ASC"
    ))?;
    let rows = stmt.query_map(params![email], |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn update_booking_status(
    conn: &Connection,
    id: &str,
    status: BookingStatus,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), now_str(), id],
    )?;
    Ok(count > 0)
}

pub fn update_booking_schedule(
    conn: &Connection,
    id: &str,
    date: NaiveDate,
    start_minutes: i64,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET date = ?1, start_minutes = ?2, updated_at = ?3 WHERE id = ?4",
        params![date.format("%Y-%m-%d").to_string(), start_minutes, now_str(), id],
    )?;
    Ok(count > 0)
}

pub fn update_booking_contact(
    conn: &Connection,
    id: &str,
    customer_name: Option<&str>,
    customer_phone: Option<&str>,
    customer_email: Option<&str>,
    notes: Option<&str>,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET
            customer_name = COALESCE(?1, customer_name),
            customer_phone = COALESCE(?2, customer_phone),
            customer_email = COALESCE(?3, customer_email),
            notes = COALESCE(?4, notes),
            updated_at = ?5
         WHERE id = ?6",
        params![customer_name, customer_phone, customer_email, notes, now_str(), id],
    )?;
    Ok(count > 0)
}

pub fn set_booking_plan(
    conn: &Connection,
    id: &str,
    plan_type: PlanType,
    plan_price_paise: i64,
    monthly_day: Option<u32>,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET plan_type = ?1, plan_price_paise = ?2, monthly_day = ?3, updated_at = ?4
         WHERE id = ?5",
        params![plan_type.as_str(), plan_price_paise, monthly_day, now_str(), id],
    )?;
    Ok(count > 0)
}

pub fn set_completion_flags(
    conn: &Connection,
    id: &str,
    inspection_completed: Option<bool>,
    service_completed: Option<bool>,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET
            inspection_completed = COALESCE(?1, inspection_completed),
            service_completed = COALESCE(?2, service_completed),
            updated_at = ?3
         WHERE id = ?4",
        params![
            inspection_completed.map(|b| b as i32),
            service_completed.map(|b| b as i32),
            now_str(),
            id
        ],
    )?;
    Ok(count > 0)
}

pub fn set_gateway_order_id(
    conn: &Connection,
    id: &str,
    gateway_order_id: &str,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET gateway_order_id = ?1, updated_at = ?2 WHERE id = ?3",
        params![gateway_order_id, now_str(), id],
    )?;
    Ok(count > 0)
}

/// Confirmation write used inside the reconciliation transaction. The
/// monthly day is only filled when still NULL so the first anchor sticks.
pub fn confirm_booking_paid(
    conn: &Connection,
    id: &str,
    amount_paise: i64,
    anchor_day: Option<u32>,
    notes: Option<&str>,
) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE bookings SET
            status = 'CONFIRMED',
            amount_paid_paise = ?1,
            monthly_day = CASE WHEN monthly_day IS NULL THEN ?2 ELSE monthly_day END,
            notes = COALESCE(?3, notes),
            updated_at = ?4
         WHERE id = ?5",
        params![amount_paise, anchor_day, notes, now_str(), id],
    )?;
    Ok(())
}

/// Cancels every booking that references a gateway order id. Used when a
/// callback arrives with a bad signature.
pub fn cancel_bookings_by_gateway_order(
    conn: &Connection,
    gateway_order_id: &str,
) -> anyhow::Result<usize> {
    let count = conn.execute(
        "UPDATE bookings SET status = 'CANCELLED', updated_at = ?1
         WHERE gateway_order_id = ?2 AND status != 'CANCELLED'",
        params![now_str(), gateway_order_id],
    )?;
    conn.execute(
        "UPDATE orders SET status = 'CANCELLED', updated_at = ?1
         WHERE id IN (SELECT id FROM bookings WHERE gateway_order_id = ?2)",
        params![now_str(), gateway_order_id],
    )?;
    Ok(count)
}

/// Slot ledger read: CONFIRMED bookings holding (service, date, start),
/// optionally excluding one booking id.
pub fn count_confirmed_at_slot(
    conn: &Connection,
    service_id: &str,
    date: NaiveDate,
    start_minutes: i64,
    exclude_booking_id: Option<&str>,
) -> anyhow::Result<i64> {
    let date_str = date.format("%Y-%m-%d").to_string();
    let count: i64 = match exclude_booking_id {
        Some(exclude) => conn.query_row(
            "SELECT COUNT(*) FROM bookings
             WHERE service_id = ?1 AND date = ?2 AND start_minutes = ?3
               AND status = 'CONFIRMED' AND id != ?4",
            params![service_id, date_str, start_minutes, exclude],
            |row| row.get(0),
        )?,
        None => conn.query_row(
            "SELECT COUNT(*) FROM bookings
             WHERE service_id = ?1 AND date = ?2 AND start_minutes = ?3
               AND status = 'CONFIRMED'",
            params![service_id, date_str, start_minutes],
            |row| row.get(0),
        )?,
    };
    Ok(count)
}

/// Start times with their CONFIRMED booking count for one service/date.
pub fn confirmed_counts_for_date(
    conn: &Connection,
    service_id: &str,
    date: NaiveDate,
) -> anyhow::Result<Vec<(i64, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT start_minutes, COUNT(*) FROM bookings
         WHERE service_id = ?1 AND date = ?2 AND status = 'CONFIRMED'
         GROUP BY start_minutes ORDER BY start_minutes ASC",
    )?;
    let rows = stmt.query_map(
        params![service_id, date.format("%Y-%m-%d").to_string()],
        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
    )?;

    let mut counts = vec![];
    for row in rows {
        counts.push(row?);
    }
    Ok(counts)
}

/// Cancels PENDING bookings whose slot start fell before the given civil
/// cutoff. Auxiliary sweep; the reconciliation never depends on it.
pub fn cancel_stale_pending(
    conn: &Connection,
    cutoff_date: NaiveDate,
    cutoff_minutes: i64,
) -> anyhow::Result<usize> {
    let date_str = cutoff_date.format("%Y-%m-%d").to_string();
    let count = conn.execute(
        "UPDATE bookings SET status = 'CANCELLED', updated_at = ?1
         WHERE status = 'PENDING'
           AND (date < ?2 OR (date = ?2 AND start_minutes <= ?3))",
        params![now_str(), date_str, cutoff_minutes],
    )?;
    conn.execute(
        "UPDATE orders SET status = 'CANCELLED', updated_at = ?1
         WHERE status = 'PENDING'
           AND id IN (SELECT id FROM bookings WHERE status = 'CANCELLED')",
        params![now_str()],
    )?;
    Ok(count)
}

pub struct DashboardStats {
    pub pending_bookings: i64,
    pub confirmed_bookings: i64,
    pub cancelled_bookings: i64,
    pub paid_orders: i64,
}

pub fn get_dashboard_stats(conn: &Connection) -> anyhow::Result<DashboardStats> {
    let count_status = |status: &str| -> i64 {
        conn.query_row(
            "SELECT COUNT(*) FROM bookings WHERE status = ?1",
            params![status],
            |row| row.get(0),
        )
        .unwrap_or(0)
    };

    let paid_orders: i64 = conn
        .query_row("SELECT COUNT(*) FROM orders WHERE status = 'PAID'", [], |row| row.get(0))
        .unwrap_or(0);

    Ok(DashboardStats {
        pending_bookings: count_status("PENDING"),
        confirmed_bookings: count_status("CONFIRMED"),
        cancelled_bookings: count_status("CANCELLED"),
        paid_orders,
    })
}

// ── Orders ──

fn parse_order_row(row: &rusqlite::Row) -> anyhow::Result<Order> {
    let status: String = row.get(8)?;
    let details_str: Option<String> = row.get(11)?;
    let created_at_str: String = row.get(12)?;
    let updated_at_str: String = row.get(13)?;

    let created_at = NaiveDateTime::parse_from_str(&created_at_str, "%Y-%m-%d %H:%M:%S")
        .unwrap_or_else(|_| Utc::now().naive_utc());
    let updated_at = NaiveDateTime::parse_from_str(&updated_at_str, "%Y-%m-%d %H:%M:%S")
        .unwrap_or_else(|_| Utc::now().naive_utc());

    Ok(Order {
        id: row.get(0)?,
        customer: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        address: row.get(4)?,
        city: row.get(5)?,
        pincode: row.get(6)?,
        total_paise: row.get(7)?,
        status: OrderStatus::from_str(&status),
        gateway_payment_id: row.get(9)?,
        payment_method: row.get(10)?,
        payment_details: details_str.and_then(|s| serde_json::from_str(&s).ok()),
        created_at,
        updated_at,
    })
}

pub fn create_pending_order(conn: &Connection, order: &Order) -> anyhow::Result<()> {
    let details = order
        .payment_details
        .as_ref()
        .map(|d| d.to_string());
    conn.execute(
        &format!("INSERT INTO orders ({ORDER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"),
        params![
            order.id,
            order.customer,
            order.email,
            order.phone,
            order.address,
            order.city,
            order.pincode,
            order.total_paise,
            order.status.as_str(),
            order.gateway_payment_id,
            order.payment_method,
            details,
            order.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            order.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ],
    )?;
    Ok(())
}

/// PAID upsert used by the reconciliation: updates the projection when the
/// optimistic PENDING row exists, creates it when it does not.
pub fn upsert_order_paid(
    conn: &Connection,
    booking: &Booking,
    amount_paise: i64,
    gateway_payment_id: &str,
    payment_details: &serde_json::Value,
) -> anyhow::Result<()> {
    let address = [
        booking.address_line1.as_str(),
        booking.address_line2.as_deref().unwrap_or(""),
    ]
    .iter()
    .filter(|s| !s.is_empty())
    .cloned()
    .collect::<Vec<_>>()
    .join(", ");

    conn.execute(
        &format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'PAID', ?9, 'Razorpay', ?10, ?11, ?11)
             ON CONFLICT(id) DO UPDATE SET
               status = 'PAID',
               total_paise = excluded.total_paise,
               gateway_payment_id = excluded.gateway_payment_id,
               payment_details = excluded.payment_details,
               updated_at = excluded.updated_at"
        ),
        params![
            booking.id,
            booking.customer_name,
            booking.customer_email,
            booking.customer_phone,
            address,
            booking.city,
            booking.postal_code,
            amount_paise,
            gateway_payment_id,
            payment_details.to_string(),
            now_str(),
        ],
    )?;
    Ok(())
}

pub fn set_order_status(conn: &Connection, id: &str, status: OrderStatus) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE orders SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), now_str(), id],
    )?;
    Ok(count > 0)
}

pub fn get_order(conn: &Connection, id: &str) -> anyhow::Result<Option<Order>> {
    let result = conn.query_row(
        &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"),
        params![id],
        |row| Ok(parse_order_row(row)),
    );

    match result {
        Ok(order) => Ok(Some(order?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn orders_for_email(conn: &Connection, email: &str) -> anyhow::Result<Vec<Order>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE email = ?1 ORDER BY created_at DESC"
    ))?;
    let rows = stmt.query_map(params![email], |row| Ok(parse_order_row(row)))?;

    let mut orders = vec![];
    for row in rows {
        orders.push(row??);
    }
    Ok(orders)
}

pub fn get_all_orders(
    conn: &Connection,
    status_filter: Option<&str>,
    limit: i64,
) -> anyhow::Result<Vec<Order>> {
    let (sql, params_vec): (String, Vec<Box<dyn rusqlite::types::ToSql>>) = match status_filter {
        Some(status) => (
            format!(
                "SELECT {ORDER_COLUMNS} FROM orders WHERE status = ?1 \
                 ORDER BY created_at DESC LIMIT ?2"
            ),
            vec![
                Box::new(status.to_string()) as Box<dyn rusqlite::types::ToSql>,
                Box::new(limit),
            ],
        ),
        None => (
            format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC LIMIT ?1"),
            vec![Box::new(limit) as Box<dyn rusqlite::types::ToSql>],
        ),
    };

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| Ok(parse_order_row(row)))?;

    let mut orders = vec![];
    for row in rows {
        orders.push(row??);
    }
    Ok(orders)
}

// ── Users ──

pub fn get_user(conn: &Connection, email: &str) -> anyhow::Result<Option<User>> {
    let result = conn.query_row(
        "SELECT email, name, is_on_hold FROM users WHERE email = ?1",
        params![email],
        |row| {
            Ok(User {
                email: row.get(0)?,
                name: row.get(1)?,
                is_on_hold: row.get::<_, i32>(2)? != 0,
            })
        },
    );

    match result {
        Ok(user) => Ok(Some(user)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Looks up the identity; first sighting creates a row with the hold flag
/// clear (holds are applied by support tooling, not by the core).
pub fn ensure_user(conn: &Connection, email: &str) -> anyhow::Result<User> {
    if let Some(user) = get_user(conn, email)? {
        return Ok(user);
    }
    conn.execute(
        "INSERT OR IGNORE INTO users (email, is_on_hold) VALUES (?1, 0)",
        params![email],
    )?;
    Ok(User {
        email: email.to_string(),
        name: None,
        is_on_hold: false,
    })
}

pub fn set_user_hold(conn: &Connection, email: &str, on_hold: bool) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE users SET is_on_hold = ?1 WHERE email = ?2",
        params![on_hold as i32, email],
    )?;
    Ok(count > 0)
}
