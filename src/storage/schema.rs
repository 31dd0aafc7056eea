//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the catalog database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per unique marketplace domain
CREATE TABLE IF NOT EXISTS domains (
    domain TEXT PRIMARY KEY,
    tld TEXT NOT NULL,
    available INTEGER,
    price REAL,
    currency TEXT,
    status TEXT,
    raw TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_domains_tld ON domains(tld);
CREATE INDEX IF NOT EXISTS idx_domains_available ON domains(available);
CREATE INDEX IF NOT EXISTS idx_domains_price ON domains(price);

-- Sync cursor, watermark and error state
CREATE TABLE IF NOT EXISTS sync_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
