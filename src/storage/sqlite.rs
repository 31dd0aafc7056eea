//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the CatalogStore trait.

use crate::extract::{source_timestamp, DomainRecord};
use crate::query::{DomainFilter, DomainSort};
use crate::state::MetaKey;
use crate::storage::filter_sql::{order_clause, where_clause};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{CatalogStore, StorageResult};
use crate::storage::FilterSummary;
use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value as SqlValue};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;

const RECORD_COLUMNS: &str =
    "domain, tld, available, price, currency, status, raw, updated_at";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens (or creates) the catalog database at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // Configure SQLite for concurrent readers during a sync
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA mmap_size = 268435456;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

impl CatalogStore for SqliteStorage {
    // ===== Records =====

    fn upsert_batch(
        &mut self,
        records: &[DomainRecord],
        now: DateTime<Utc>,
    ) -> StorageResult<usize> {
        let updated_at = now.to_rfc3339();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO domains (domain, tld, available, price, currency, status, raw, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(domain) DO UPDATE SET
                    tld = excluded.tld,
                    available = excluded.available,
                    price = excluded.price,
                    currency = excluded.currency,
                    status = excluded.status,
                    raw = excluded.raw,
                    updated_at = excluded.updated_at",
            )?;

            for record in records {
                let raw = serde_json::to_string(&record.raw)?;
                stmt.execute(params![
                    record.domain,
                    record.tld,
                    record.available,
                    record.price,
                    record.currency,
                    record.status,
                    raw,
                    updated_at,
                ])?;
            }
        }
        tx.commit()?;

        Ok(records.len())
    }

    fn get_record(&self, domain: &str) -> StorageResult<Option<DomainRecord>> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM domains WHERE domain = ?1"),
                params![domain.to_ascii_lowercase()],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn count_records(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM domains", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn discover_fields(&self) -> StorageResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT j.key FROM domains, json_each(domains.raw) AS j
             WHERE j.key IS NOT NULL ORDER BY j.key",
        )?;

        let fields = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(fields)
    }

    fn reset(&mut self) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM domains", [])?;
        tx.execute("DELETE FROM sync_meta", [])?;
        tx.commit()?;
        Ok(())
    }

    // ===== Queries =====

    fn count_matching(&self, filter: &DomainFilter) -> StorageResult<u64> {
        let filter_sql = where_clause(filter);
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM domains{}", filter_sql.sql),
            params_from_iter(filter_sql.params.iter()),
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn select_page(
        &self,
        filter: &DomainFilter,
        sort: &DomainSort,
        limit: u32,
        offset: u64,
    ) -> StorageResult<Vec<DomainRecord>> {
        let filter_sql = where_clause(filter);
        let order_sql = order_clause(sort);

        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM domains{}{} LIMIT ? OFFSET ?",
            filter_sql.sql, order_sql.sql
        );

        let mut params = filter_sql.params;
        params.extend(order_sql.params);
        params.push(SqlValue::Integer(i64::from(limit)));
        params.push(SqlValue::Integer(offset.min(i64::MAX as u64) as i64));

        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_from_iter(params.iter()), record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    fn summarize(&self, filter: &DomainFilter, top_n: usize) -> StorageResult<FilterSummary> {
        let filter_sql = where_clause(filter);

        let (total, available, average_price, distinct_tlds) = self.conn.query_row(
            &format!(
                "SELECT COUNT(*),
                        COALESCE(SUM(CASE WHEN available = 1 THEN 1 ELSE 0 END), 0),
                        AVG(price),
                        COUNT(DISTINCT tld)
                 FROM domains{}",
                filter_sql.sql
            ),
            params_from_iter(filter_sql.params.iter()),
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<f64>>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            },
        )?;

        let mut params = filter_sql.params;
        params.push(SqlValue::Integer(top_n.min(i64::MAX as usize) as i64));

        let mut stmt = self.conn.prepare(&format!(
            "SELECT tld, COUNT(*) AS n FROM domains{}
             GROUP BY tld ORDER BY n DESC, tld ASC LIMIT ?",
            filter_sql.sql
        ))?;
        let top_tlds = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(FilterSummary {
            total: total as u64,
            available: available as u64,
            average_price,
            distinct_tlds: distinct_tlds as u64,
            top_tlds,
        })
    }

    fn matching_raw(
        &self,
        filter: &DomainFilter,
    ) -> StorageResult<Vec<(String, Map<String, Value>)>> {
        let filter_sql = where_clause(filter);
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT tld, raw FROM domains{}", filter_sql.sql))?;

        let rows = stmt
            .query_map(params_from_iter(filter_sql.params.iter()), |row| {
                Ok((row.get::<_, String>(0)?, raw_from_row(row, 1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    fn max_source_timestamp(&self) -> StorageResult<Option<DateTime<Utc>>> {
        let mut stmt = self.conn.prepare("SELECT raw FROM domains")?;
        let mut rows = stmt.query([])?;

        let mut latest: Option<DateTime<Utc>> = None;
        while let Some(row) = rows.next()? {
            let raw = raw_from_row(row, 0)?;
            if let Some(ts) = source_timestamp(&raw) {
                latest = Some(latest.map_or(ts, |current| current.max(ts)));
            }
        }

        Ok(latest)
    }

    // ===== Sync Metadata =====

    fn load_meta(&self) -> StorageResult<HashMap<String, String>> {
        let mut stmt = self.conn.prepare("SELECT key, value FROM sync_meta")?;
        let entries = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<HashMap<String, String>, _>>()?;
        Ok(entries)
    }

    fn get_meta(&self, key: MetaKey) -> StorageResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM sync_meta WHERE key = ?1",
                params![key.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn write_meta(&mut self, updates: &[(MetaKey, Option<String>)]) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        for (key, value) in updates {
            match value {
                Some(value) => {
                    tx.execute(
                        "INSERT INTO sync_meta (key, value, updated_at) VALUES (?1, ?2, ?3)
                         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                        params![key.as_str(), value, now],
                    )?;
                }
                None => {
                    tx.execute(
                        "DELETE FROM sync_meta WHERE key = ?1",
                        params![key.as_str()],
                    )?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }
}

fn raw_from_row(row: &Row<'_>, index: usize) -> rusqlite::Result<Map<String, Value>> {
    let text: String = row.get(index)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<DomainRecord> {
    let updated_at: Option<String> = row.get(7)?;
    Ok(DomainRecord {
        domain: row.get(0)?,
        tld: row.get(1)?,
        available: row.get(2)?,
        price: row.get(3)?,
        currency: row.get(4)?,
        status: row.get(5)?,
        raw: raw_from_row(row, 6)?,
        updated_at: updated_at
            .and_then(|t| DateTime::parse_from_rfc3339(&t).ok())
            .map(|t| t.with_timezone(&Utc)),
    })
}
