//! Discovery of the upstream total count and page count
//!
//! Marketplaces report totals under many names and at different nesting
//! levels (`meta.pagination.total`, `totalCount`, ...). Only objects are
//! searched; arrays hold rows, whose own `count` fields mean something else.

use serde_json::{Map, Value};

const TOTAL_COUNT_FIELDS: &[&str] = &[
    "total",
    "total_count",
    "totalCount",
    "total_items",
    "totalItems",
    "total_results",
    "totalResults",
    "count",
];

const TOTAL_PAGES_FIELDS: &[&str] = &[
    "total_pages",
    "totalPages",
    "last_page",
    "lastPage",
    "page_count",
    "pageCount",
];

const MAX_TOTALS_DEPTH: usize = 3;

/// Total number of records reported by the payload, if any
pub fn find_total_count(payload: &Value) -> Option<u64> {
    find_count(payload, TOTAL_COUNT_FIELDS)
}

/// Total number of pages reported by the payload, if any
pub fn find_total_pages(payload: &Value) -> Option<u32> {
    find_count(payload, TOTAL_PAGES_FIELDS)
        .filter(|pages| *pages >= 1)
        .and_then(|pages| u32::try_from(pages).ok())
}

/// `ceil(total / page_size)`, at least one page
pub fn pages_for(total: u64, page_size: u32) -> u32 {
    let page_size = u64::from(page_size.max(1));
    let pages = total.div_ceil(page_size).max(1);
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// Breadth-first over nested objects so shallower totals win
fn find_count(payload: &Value, names: &[&str]) -> Option<u64> {
    let mut level: Vec<&Map<String, Value>> = match payload {
        Value::Object(map) => vec![map],
        _ => return None,
    };

    for _ in 0..MAX_TOTALS_DEPTH {
        for map in &level {
            for name in names {
                let found = map
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                    .and_then(|(_, value)| as_count(value));
                if found.is_some() {
                    return found;
                }
            }
        }

        level = level
            .iter()
            .flat_map(|map| map.values())
            .filter_map(Value::as_object)
            .collect();
        if level.is_empty() {
            break;
        }
    }

    None
}

fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
