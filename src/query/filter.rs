use crate::query::{is_safe_field_name, QueryError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Tri-state availability filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    /// `available` is true
    Available,
    /// `available` is false
    Unavailable,
    /// `available` could not be determined
    Unknown,
}

impl FromStr for Availability {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "available" => Ok(Self::Available),
            "false" | "no" | "unavailable" => Ok(Self::Unavailable),
            "unknown" | "null" | "none" => Ok(Self::Unknown),
            other => Err(QueryError::InvalidAvailability(other.to_string())),
        }
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Available => "available",
            Self::Unavailable => "unavailable",
            Self::Unknown => "unknown",
        })
    }
}

/// Predicate shared by the query and analytics engines
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainFilter {
    /// Case-insensitive substring of the domain name
    pub search: Option<String>,

    /// Exact TLD (without the dot)
    pub tld: Option<String>,

    pub availability: Option<Availability>,

    /// Raw field name -> case-insensitive substring of its value
    #[serde(default)]
    pub columns: BTreeMap<String, String>,
}

impl DomainFilter {
    /// Adds a raw-field substring filter
    pub fn with_column(mut self, field: impl Into<String>, needle: impl Into<String>) -> Self {
        self.columns.insert(field.into(), needle.into());
        self
    }

    /// Trims every value, drops empty ones and validates column names
    ///
    /// Search text and TLD are lower-cased since stored domains are. A leading
    /// dot on the TLD is ignored.
    pub fn normalized(&self) -> Result<DomainFilter, QueryError> {
        let search = non_empty(self.search.as_deref()).map(|s| s.to_lowercase());
        let tld = non_empty(self.tld.as_deref())
            .map(|t| t.trim_start_matches('.').to_lowercase())
            .filter(|t| !t.is_empty());

        let mut columns = BTreeMap::new();
        for (field, needle) in &self.columns {
            let field = field.trim();
            if !is_safe_field_name(field) {
                return Err(QueryError::InvalidField(field.to_string()));
            }
            if let Some(needle) = non_empty(Some(needle)) {
                columns.insert(field.to_string(), needle.to_string());
            }
        }

        Ok(DomainFilter {
            search,
            tld,
            availability: self.availability,
            columns,
        })
    }

    /// Canonical text form of the normalized predicate
    ///
    /// Column filters are emitted in key order, so equal predicates produce
    /// equal keys regardless of how they were built.
    pub fn cache_key(&self) -> Result<String, QueryError> {
        let filter = self.normalized()?;
        let mut key = format!(
            "search={}|tld={}|available={}",
            filter.search.as_deref().unwrap_or(""),
            filter.tld.as_deref().unwrap_or(""),
            filter
                .availability
                .map(|a| a.to_string())
                .unwrap_or_default()
        );
        for (field, needle) in &filter.columns {
            key.push_str(&format!("|{}={}", field, needle));
        }
        Ok(key)
    }

    /// Returns true if the predicate matches everything
    pub fn is_empty(&self) -> bool {
        self.search.is_none()
            && self.tld.is_none()
            && self.availability.is_none()
            && self.columns.is_empty()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
