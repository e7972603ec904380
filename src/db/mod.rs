pub mod migrations;
pub mod queries;

use anyhow::Context;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::models::ServiceCategory;

pub fn init_db(path: &str) -> anyhow::Result<Connection> {
    let conn = Connection::open(path).context("failed to open database")?;

    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
        .context("failed to set database pragmas")?;

    migrations::run_migrations(&conn)?;
    seed_services(&conn)?;

    Ok(conn)
}

/// Populates the service catalog on first boot. Slugs are referenced by the
/// pricing rules, so the set is fixed rather than admin-editable here.
fn seed_services(conn: &Connection) -> anyhow::Result<()> {
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM services", [], |row| row.get(0))
        .context("failed to count services")?;
    if count > 0 {
        return Ok(());
    }

    let services: [(&str, &str, i64, ServiceCategory); 5] = [
        ("garden-services", "Garden Services", 499, ServiceCategory::Inspection),
        ("kitchen-gardening", "Kitchen Gardening", 300, ServiceCategory::Maintenance),
        ("plants-on-rent", "Plants on Rent", 999, ServiceCategory::Maintenance),
        ("plant-hostel-service", "Plant Hostel Service", 599, ServiceCategory::Maintenance),
        ("landscape-design", "Landscape Design", 1499, ServiceCategory::Maintenance),
    ];

    for (slug, name, price_min, category) in services {
        conn.execute(
            "INSERT INTO services (id, slug, name, price_min, category) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![Uuid::new_v4().to_string(), slug, name, price_min, category.as_str()],
        )
        .with_context(|| format!("failed to seed service: {slug}"))?;
    }

    tracing::info!("seeded service catalog");
    Ok(())
}
