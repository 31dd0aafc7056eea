//! Aggregation of analytics snapshots from the store

use crate::analytics::{AnalyticsSnapshot, Heatmap, LabelCount};
use crate::extract::field_ci;
use crate::query::DomainFilter;
use crate::storage::{CatalogStore, StorageResult};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};

/// Raw fields holding technology-stack tags, in priority order
pub const TECH_STACK_FIELDS: &[&str] = &[
    "tech_stack",
    "techStack",
    "technologies",
    "technology",
    "stack",
    "tecnologias",
    "tecnologia",
];

/// Raw fields holding the technical-level category, in priority order
pub const TECH_LEVEL_FIELDS: &[&str] = &[
    "technical_level",
    "technicalLevel",
    "tech_level",
    "level",
    "nivel_tecnico",
    "nivel",
];

/// Level reported for records without one
pub const UNKNOWN_LEVEL: &str = "unknown";

const TAG_DELIMITERS: &[char] = &[',', ';', '|', '/', '\n'];

const MAX_TAG_DEPTH: usize = 8;

/// Computes a snapshot over every record matching a normalized filter
pub fn compute_snapshot(
    store: &dyn CatalogStore,
    filter: &DomainFilter,
    top_n: usize,
) -> StorageResult<AnalyticsSnapshot> {
    let summary = store.summarize(filter, top_n)?;
    let records = store.matching_raw(filter)?;

    let mut tags: HashMap<String, u64> = HashMap::new();
    let mut levels: HashMap<String, u64> = HashMap::new();
    let mut cross: HashMap<(String, String), u64> = HashMap::new();

    for (tld, raw) in &records {
        if let Some(value) = first_field(raw, TECH_STACK_FIELDS) {
            for tag in flatten_tags(value) {
                *tags.entry(tag).or_default() += 1;
            }
        }

        let level = technical_level(raw);
        *levels.entry(level.clone()).or_default() += 1;
        *cross.entry((tld.clone(), level)).or_default() += 1;
    }

    let top_levels = rank(levels, top_n);
    let heatmap = build_heatmap(
        summary.top_tlds.iter().map(|(tld, _)| tld.clone()).collect(),
        top_levels.iter().map(|level| level.label.clone()).collect(),
        &cross,
    );

    Ok(AnalyticsSnapshot {
        total: summary.total,
        available: summary.available,
        average_price: summary.average_price,
        distinct_tlds: summary.distinct_tlds,
        top_tlds: summary
            .top_tlds
            .into_iter()
            .map(|(label, count)| LabelCount { label, count })
            .collect(),
        tech_stack: rank(tags, top_n),
        top_levels,
        heatmap,
    })
}

/// Flattens a tag value into a deduplicated, lower-cased, sorted tag list
///
/// Accepts delimited strings (`"react, node"`), JSON-encoded strings
/// (`"[\"react\"]"`), arrays, and objects (values are flattened; keys with a
/// `true` value count as tags).
pub fn flatten_tags(value: &Value) -> Vec<String> {
    let mut tags = BTreeSet::new();
    collect_tags(value, 0, &mut tags);
    tags.into_iter().collect()
}

fn collect_tags(value: &Value, depth: usize, tags: &mut BTreeSet<String>) {
    if depth > MAX_TAG_DEPTH {
        return;
    }

    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.starts_with('[') || trimmed.starts_with('{') {
                if let Ok(decoded) = serde_json::from_str::<Value>(trimmed) {
                    collect_tags(&decoded, depth + 1, tags);
                    return;
                }
            }
            for part in trimmed.split(TAG_DELIMITERS) {
                let tag = part.trim().trim_matches('"').trim();
                if !tag.is_empty() {
                    tags.insert(tag.to_lowercase());
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_tags(item, depth + 1, tags);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                match item {
                    Value::Bool(true) => {
                        tags.insert(key.trim().to_lowercase());
                    }
                    other => collect_tags(other, depth + 1, tags),
                }
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

/// Technical level of a raw record, or [`UNKNOWN_LEVEL`]
pub fn technical_level(raw: &Map<String, Value>) -> String {
    let label = match first_field(raw, TECH_LEVEL_FIELDS) {
        Some(Value::String(s)) => s.trim().to_lowercase(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };

    if label.is_empty() {
        UNKNOWN_LEVEL.to_string()
    } else {
        label
    }
}

fn first_field<'a>(raw: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|name| field_ci(raw, name))
        .find(|value| !value.is_null())
}

/// Most frequent first, ties by label
fn rank(counts: HashMap<String, u64>, top_n: usize) -> Vec<LabelCount> {
    let mut ranked: Vec<LabelCount> = counts
        .into_iter()
        .map(|(label, count)| LabelCount { label, count })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    ranked.truncate(top_n);
    ranked
}

fn build_heatmap(
    rows: Vec<String>,
    columns: Vec<String>,
    cross: &HashMap<(String, String), u64>,
) -> Heatmap {
    let cells: Vec<Vec<u64>> = rows
        .iter()
        .map(|tld| {
            columns
                .iter()
                .map(|level| {
                    cross
                        .get(&(tld.clone(), level.clone()))
                        .copied()
                        .unwrap_or(0)
                })
                .collect()
        })
        .collect();

    let max = cells.iter().flatten().copied().max().unwrap_or(0);

    Heatmap {
        rows,
        columns,
        cells,
        max,
    }
}
