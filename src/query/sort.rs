use crate::query::{is_safe_field_name, QueryError};
use serde::Serialize;
use std::str::FromStr;

/// Normalized columns of the domain table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FixedColumn {
    Domain,
    Tld,
    Available,
    Price,
    Currency,
    Status,
}

impl FixedColumn {
    pub fn column_name(&self) -> &'static str {
        match self {
            Self::Domain => "domain",
            Self::Tld => "tld",
            Self::Available => "available",
            Self::Price => "price",
            Self::Currency => "currency",
            Self::Status => "status",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "domain" => Some(Self::Domain),
            "tld" => Some(Self::Tld),
            "available" => Some(Self::Available),
            "price" => Some(Self::Price),
            "currency" => Some(Self::Currency),
            "status" => Some(Self::Status),
            _ => None,
        }
    }
}

/// What a page of results is ordered by
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SortKey {
    Column(FixedColumn),
    /// A top-level field of the raw upstream JSON; the name is validated
    Raw(String),
}

impl Default for SortKey {
    fn default() -> Self {
        Self::Column(FixedColumn::Domain)
    }
}

impl FromStr for SortKey {
    type Err = QueryError;

    /// Fixed column names win; anything else must be a safe raw field name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        if let Some(column) = FixedColumn::from_name(&name.to_ascii_lowercase()) {
            return Ok(Self::Column(column));
        }
        if is_safe_field_name(name) {
            Ok(Self::Raw(name.to_string()))
        } else {
            Err(QueryError::InvalidField(name.to_string()))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Sort key plus direction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DomainSort {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl DomainSort {
    pub fn new(key: SortKey, direction: SortDirection) -> Self {
        Self { key, direction }
    }
}
