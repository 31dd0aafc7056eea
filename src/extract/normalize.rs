//! Row normalization and best-effort field coercion

use crate::extract::domain::{find_domain, tld_of};
use crate::extract::DomainRecord;
use serde_json::{Map, Value};

/// Fields searched for the domain name, in priority order
const DOMAIN_FIELDS: &[&str] = &[
    "domain",
    "domain_name",
    "domainName",
    "fqdn",
    "hostname",
    "host",
    "dominio",
    "nombre_dominio",
    "name",
    "nombre",
    "url",
    "website",
    "sitio",
];

const AVAILABLE_FIELDS: &[&str] = &[
    "available",
    "is_available",
    "isAvailable",
    "availability",
    "disponible",
    "disponibilidad",
    "is_free",
    "libre",
];

const PRICE_FIELDS: &[&str] = &[
    "price",
    "precio",
    "buy_now_price",
    "buyNowPrice",
    "asking_price",
    "amount",
    "cost",
    "valor",
    "importe",
];

const CURRENCY_FIELDS: &[&str] = &["currency", "currency_code", "currencyCode", "moneda", "divisa"];

const STATUS_FIELDS: &[&str] = &["status", "state", "estado", "listing_status", "listingStatus"];

const TRUE_TOKENS: &[&str] = &[
    "true", "yes", "y", "1", "on", "available", "free", "si", "sí", "verdadero", "disponible",
    "libre",
];

const FALSE_TOKENS: &[&str] = &[
    "false",
    "no",
    "n",
    "0",
    "off",
    "unavailable",
    "taken",
    "sold",
    "falso",
    "no disponible",
    "ocupado",
    "vendido",
];

/// Depth bound for the full-value domain scan
const MAX_VALUE_DEPTH: usize = 5;

/// Converts one upstream row into a [`DomainRecord`]
///
/// String rows are scanned for a domain directly and kept as `{"domain": row}`.
/// Object rows are searched through a priority list of field names before
/// falling back to a scan of every value. Rows without a recognizable domain
/// yield `None`; they are dropped, never reported as errors.
///
/// # Examples
///
/// ```
/// use domain_catalog::extract::normalize;
/// use serde_json::json;
///
/// let row = json!({"domain_name": "Example.COM", "disponible": "si", "precio": "12,50"});
/// let record = normalize(&row).unwrap();
/// assert_eq!(record.domain, "example.com");
/// assert_eq!(record.tld, "com");
/// assert_eq!(record.available, Some(true));
/// assert_eq!(record.price, Some(12.5));
/// ```
pub fn normalize(row: &Value) -> Option<DomainRecord> {
    match row {
        Value::String(text) => {
            let domain = find_domain(text)?;
            let mut raw = Map::new();
            raw.insert("domain".to_string(), row.clone());
            Some(DomainRecord::new(domain, raw))
        }
        Value::Object(map) => {
            let domain = domain_from_fields(map).or_else(|| scan_for_domain(row, 0))?;
            let (price, nested_currency) = price_of(map);

            let mut record = DomainRecord::new(domain, map.clone());
            record.available = first_coerced(map, AVAILABLE_FIELDS, coerce_bool);
            record.price = price;
            record.currency =
                first_coerced(map, CURRENCY_FIELDS, coerce_currency).or(nested_currency);
            record.status = first_coerced(map, STATUS_FIELDS, coerce_label);
            Some(record)
        }
        _ => None,
    }
}

impl DomainRecord {
    fn new(domain: String, raw: Map<String, Value>) -> Self {
        let tld = tld_of(&domain);
        Self {
            domain,
            tld,
            available: None,
            price: None,
            currency: None,
            status: None,
            raw,
            updated_at: None,
        }
    }
}

/// Looks up a field by name, ignoring ASCII case
pub(crate) fn field_ci<'a>(map: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    map.get(name).or_else(|| {
        map.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    })
}

fn first_coerced<T>(
    map: &Map<String, Value>,
    names: &[&str],
    coerce: impl Fn(&Value) -> Option<T>,
) -> Option<T> {
    names
        .iter()
        .filter_map(|name| field_ci(map, name))
        .find_map(coerce)
}

fn domain_from_fields(map: &Map<String, Value>) -> Option<String> {
    DOMAIN_FIELDS
        .iter()
        .filter_map(|name| field_ci(map, name))
        .find_map(|value| scan_for_domain(value, 0))
}

fn scan_for_domain(value: &Value, depth: usize) -> Option<String> {
    if depth > MAX_VALUE_DEPTH {
        return None;
    }
    match value {
        Value::String(text) => find_domain(text),
        Value::Array(items) => items.iter().find_map(|v| scan_for_domain(v, depth + 1)),
        Value::Object(map) => map.values().find_map(|v| scan_for_domain(v, depth + 1)),
        _ => None,
    }
}

/// Price plus any currency carried inside a `{amount, currency}` price object
fn price_of(map: &Map<String, Value>) -> (Option<f64>, Option<String>) {
    for value in PRICE_FIELDS.iter().filter_map(|name| field_ci(map, name)) {
        if let Value::Object(inner) = value {
            let amount = ["amount", "value", "valor", "price"]
                .iter()
                .filter_map(|name| field_ci(inner, name))
                .find_map(coerce_price);
            if amount.is_some() {
                let currency = first_coerced(inner, CURRENCY_FIELDS, coerce_currency);
                return (amount, currency);
            }
        } else if let Some(price) = coerce_price(value) {
            return (Some(price), None);
        }
    }
    (None, None)
}

/// Coerces common boolean encodings in English and Spanish
pub fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_f64() {
            Some(x) if x == 1.0 => Some(true),
            Some(x) if x == 0.0 => Some(false),
            _ => None,
        },
        Value::String(s) => {
            let token = s.trim().to_lowercase();
            if TRUE_TOKENS.contains(&token.as_str()) {
                Some(true)
            } else if FALSE_TOKENS.contains(&token.as_str()) {
                Some(false)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Coerces a number or numeric string, accepting a comma decimal separator
pub fn coerce_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_decimal(s),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

fn coerce_price(value: &Value) -> Option<f64> {
    coerce_number(value).filter(|price| *price >= 0.0)
}

fn coerce_currency(value: &Value) -> Option<String> {
    let code = value.as_str()?.trim();
    if code.is_empty() || code.len() > 10 {
        return None;
    }
    Some(code.to_uppercase())
}

fn coerce_label(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Parses `"12,50"`, `"1.234,50"`, `"1,234.50"`, `"$ 12.50"` and similar
fn parse_decimal(text: &str) -> Option<f64> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
        .collect();

    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let commas = cleaned.matches(',').count();
    let dots = cleaned.matches('.').count();

    let canonical = match (commas, dots) {
        (0, 0) => cleaned,
        (0, 1) => cleaned,
        (0, _) => cleaned.replace('.', ""),
        (1, 0) => cleaned.replace(',', "."),
        (_, 0) => cleaned.replace(',', ""),
        _ => {
            // The separator that appears last is the decimal point.
            let last_comma = cleaned.rfind(',').unwrap_or(0);
            let last_dot = cleaned.rfind('.').unwrap_or(0);
            if last_comma > last_dot {
                cleaned.replace('.', "").replace(',', ".")
            } else {
                cleaned.replace(',', "")
            }
        }
    };

    canonical.parse::<f64>().ok()
}
