//! SQL rendering of filter predicates and sort keys
//!
//! Raw field names are only ever bound as JSON-path parameters; the SQL text
//! itself is built from fixed fragments.

use crate::query::{Availability, DomainFilter, DomainSort, SortKey};
use rusqlite::types::Value as SqlValue;

/// A SQL fragment with its positional parameters
#[derive(Debug, Default)]
pub(crate) struct SqlFragment {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// Renders ` WHERE ...` (or nothing) for a normalized filter
pub(crate) fn where_clause(filter: &DomainFilter) -> SqlFragment {
    let mut conditions: Vec<&str> = Vec::new();
    let mut params = Vec::new();

    if let Some(search) = &filter.search {
        conditions.push("domain LIKE ? ESCAPE '\\'");
        params.push(SqlValue::Text(like_pattern(search)));
    }

    if let Some(tld) = &filter.tld {
        conditions.push("tld = ?");
        params.push(SqlValue::Text(tld.clone()));
    }

    match filter.availability {
        Some(Availability::Available) => conditions.push("available = 1"),
        Some(Availability::Unavailable) => conditions.push("available = 0"),
        Some(Availability::Unknown) => conditions.push("available IS NULL"),
        None => {}
    }

    for (field, needle) in &filter.columns {
        conditions.push(
            "LOWER(CASE json_type(raw, ?) \
             WHEN 'true' THEN 'true' \
             WHEN 'false' THEN 'false' \
             ELSE CAST(json_extract(raw, ?) AS TEXT) END) LIKE ? ESCAPE '\\'",
        );
        let path = json_path(field);
        params.push(SqlValue::Text(path.clone()));
        params.push(SqlValue::Text(path));
        params.push(SqlValue::Text(like_pattern(&needle.to_lowercase())));
    }

    if conditions.is_empty() {
        return SqlFragment::default();
    }

    SqlFragment {
        sql: format!(" WHERE {}", conditions.join(" AND ")),
        params,
    }
}

/// Renders ` ORDER BY ...`; nulls sort last and domain breaks ties
pub(crate) fn order_clause(sort: &DomainSort) -> SqlFragment {
    let direction = sort.direction.as_sql();
    match &sort.key {
        SortKey::Column(column) => {
            let name = column.column_name();
            SqlFragment {
                sql: format!(
                    " ORDER BY ({name} IS NULL), {name} {direction}, domain ASC"
                ),
                params: Vec::new(),
            }
        }
        SortKey::Raw(field) => {
            let path = json_path(field);
            SqlFragment {
                sql: format!(
                    " ORDER BY (json_extract(raw, ?) IS NULL), json_extract(raw, ?) {direction}, domain ASC"
                ),
                params: vec![SqlValue::Text(path.clone()), SqlValue::Text(path)],
            }
        }
    }
}

/// JSON path addressing a top-level key, quoted so any name is literal
pub(crate) fn json_path(field: &str) -> String {
    format!("$.\"{}\"", field.replace('"', ""))
}

/// `%needle%` with LIKE wildcards escaped
fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
