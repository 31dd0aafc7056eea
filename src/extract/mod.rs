//! Row Extractor
//!
//! Turns arbitrary upstream JSON into [`DomainRecord`]s:
//! - locating the catalog row array by scoring candidate arrays
//! - finding a domain name in each row
//! - best-effort coercion of availability, price, currency and status
//! - reading creation/update timestamps for the incremental watermark
//!
//! Nothing in this module fails: unusable rows and fields become `None`.

mod domain;
mod normalize;
mod rows;
mod timestamp;

pub use domain::{contains_domain, find_domain, tld_of};
pub use normalize::{coerce_bool, coerce_number, normalize};
pub(crate) use normalize::field_ci;
pub use rows::{extract_rows, score_array, MAX_SCAN_DEPTH};
pub use timestamp::{parse_timestamp, row_timestamp, source_timestamp};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A normalized marketplace listing, one per unique domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainRecord {
    /// Lower-cased fully-qualified domain name (primary key)
    pub domain: String,

    /// Last label of `domain`
    pub tld: String,

    /// Availability; `None` when the upstream gave nothing usable
    pub available: Option<bool>,

    pub price: Option<f64>,

    pub currency: Option<String>,

    /// Free-text upstream status label
    pub status: Option<String>,

    /// Every upstream field exactly as received
    pub raw: Map<String, Value>,

    /// Set by the store on every upsert
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl DomainRecord {
    /// Creation/update time reported by the upstream for this record
    pub fn source_timestamp(&self) -> Option<DateTime<Utc>> {
        source_timestamp(&self.raw)
    }
}

/// Extracts the row array from `payload` and normalizes every usable row
pub fn normalize_payload(payload: &Value) -> Vec<DomainRecord> {
    extract_rows(payload).iter().filter_map(normalize).collect()
}
