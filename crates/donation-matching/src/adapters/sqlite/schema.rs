//! Database schema definitions

use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use super::sql_error;
use crate::domain::StoreError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("[matching] Creating new database schema v{}", SCHEMA_VERSION);
        conn.execute_batch(RECORDS_SCHEMA).map_err(sql_error)?;
        conn.execute_batch(INDEXES_SCHEMA).map_err(sql_error)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version > SCHEMA_VERSION {
        return Err(StoreError::Backend(format!(
            "database schema v{} is newer than supported v{}",
            current_version, SCHEMA_VERSION
        )));
    } else {
        info!("[matching] Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32, StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )
    .map_err(sql_error)?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .optional()
        .map_err(sql_error)?;

    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<(), StoreError> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(sql_error)?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])
        .map_err(sql_error)?;
    Ok(())
}

/// Donation and request tables.
///
/// The CHECK constraints tie each status to its link column, so a half-applied
/// transition cannot be stored.
const RECORDS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS donations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id INTEGER NOT NULL,
    donor_name TEXT NOT NULL,
    age INTEGER NOT NULL,
    blood_group TEXT NOT NULL,
    organ TEXT NOT NULL,
    contact TEXT NOT NULL,
    city TEXT NOT NULL,
    city_key TEXT NOT NULL,
    availability_date TEXT NOT NULL,
    medical_notes TEXT,
    requested_compensation TEXT NOT NULL DEFAULT '0',
    status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'accepted')),
    accepted_by INTEGER,
    created_at INTEGER NOT NULL,
    CHECK ((status = 'accepted') = (accepted_by IS NOT NULL))
);

CREATE TABLE IF NOT EXISTS requests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    requester_id INTEGER NOT NULL,
    requester_name TEXT NOT NULL,
    age INTEGER NOT NULL,
    blood_group TEXT NOT NULL,
    organ_needed TEXT NOT NULL,
    contact TEXT NOT NULL,
    city TEXT NOT NULL,
    city_key TEXT NOT NULL,
    medical_reason TEXT,
    budget TEXT NOT NULL DEFAULT '0',
    status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'matched')),
    matched_donation_id INTEGER REFERENCES donations(id),
    created_at INTEGER NOT NULL,
    CHECK ((status = 'matched') = (matched_donation_id IS NOT NULL))
);
"#;

/// Pool scans, owner lookups, and one request per donation.
const INDEXES_SCHEMA: &str = r#"
CREATE INDEX IF NOT EXISTS idx_donations_pool ON donations(organ, status, created_at);
CREATE INDEX IF NOT EXISTS idx_donations_owner ON donations(owner_id, created_at);
CREATE INDEX IF NOT EXISTS idx_requests_pool ON requests(organ_needed, status, created_at);
CREATE INDEX IF NOT EXISTS idx_requests_owner ON requests(requester_id, created_at);
CREATE UNIQUE INDEX IF NOT EXISTS idx_requests_matched_donation
    ON requests(matched_donation_id) WHERE matched_donation_id IS NOT NULL;
"#;
