//! Catalog array discovery
//!
//! The upstream payload shape is not contractually fixed, so the row array is
//! located by scoring every array found in the payload.
//!
//! # Scoring policy
//!
//! | Element                                               | Points |
//! |-------------------------------------------------------|--------|
//! | string containing a domain-shaped substring           | +2     |
//! | object with a key naming a domain or host             | +3     |
//! | object with a domain-shaped string in any field       | +1     |
//!
//! The highest score wins, longer arrays break ties, and the first array found
//! breaks remaining ties. When no array scores above zero the longest array is
//! used, so unfamiliar field names degrade the extraction instead of emptying
//! the catalog.

use crate::extract::domain::contains_domain;
use serde_json::Value;

/// Nesting depth below which arrays are not collected
pub const MAX_SCAN_DEPTH: usize = 6;

/// Key fragments that suggest an object describes a domain
const DOMAIN_KEY_HINTS: &[&str] = &["domain", "host", "dominio", "fqdn"];

/// Locates the most plausible array of catalog rows in `payload`
///
/// Returns an empty vector when the payload contains no array at all.
pub fn extract_rows(payload: &Value) -> Vec<Value> {
    let mut candidates = Vec::new();
    collect_arrays(payload, 0, &mut candidates);

    select_candidate(&candidates)
        .map(|items| items.to_vec())
        .unwrap_or_default()
}

/// Scores an array by how much it looks like the catalog row array
pub fn score_array(items: &[Value]) -> u64 {
    items.iter().map(score_element).sum()
}

fn score_element(item: &Value) -> u64 {
    match item {
        Value::String(s) if contains_domain(s) => 2,
        Value::Object(map) => {
            let mut score = 0;
            if map.keys().any(|key| is_domain_key(key)) {
                score += 3;
            }
            if map
                .values()
                .any(|v| v.as_str().map(contains_domain).unwrap_or(false))
            {
                score += 1;
            }
            score
        }
        _ => 0,
    }
}

fn is_domain_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    DOMAIN_KEY_HINTS.iter().any(|hint| key.contains(hint))
}

fn collect_arrays<'a>(value: &'a Value, depth: usize, out: &mut Vec<&'a [Value]>) {
    if depth > MAX_SCAN_DEPTH {
        return;
    }

    match value {
        Value::Array(items) => {
            out.push(items.as_slice());
            for item in items {
                collect_arrays(item, depth + 1, out);
            }
        }
        Value::Object(map) => {
            for child in map.values() {
                collect_arrays(child, depth + 1, out);
            }
        }
        _ => {}
    }
}

fn select_candidate<'a>(candidates: &[&'a [Value]]) -> Option<&'a [Value]> {
    let mut best: Option<(u64, usize, &'a [Value])> = None;

    for items in candidates {
        let key = (score_array(items), items.len());
        match best {
            Some((score, len, _)) if (score, len) >= key => {}
            _ => best = Some((key.0, key.1, items)),
        }
    }

    // A zero best score means the longest array won on length alone.
    best.map(|(_, _, items)| items)
}
