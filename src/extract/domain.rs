use regex::Regex;
use std::sync::LazyLock;

/// DNS name syntax: one or more `label.` groups followed by an alphabetic
/// final label. Labels are 1-63 alphanumeric/hyphen characters and never
/// start or end with a hyphen.
static DOMAIN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,63}\b")
        .expect("domain pattern is a valid regex")
});

/// Longest fully-qualified name DNS allows
const MAX_DOMAIN_LEN: usize = 253;

/// Finds the first domain-shaped substring in `text`
///
/// The match is lower-cased. Names longer than DNS allows are rejected.
///
/// # Examples
///
/// ```
/// use domain_catalog::extract::find_domain;
///
/// assert_eq!(find_domain("Example.COM"), Some("example.com".to_string()));
/// assert_eq!(find_domain("https://shop.example.org/path"), Some("shop.example.org".to_string()));
/// assert_eq!(find_domain("version 1.2.3"), None);
/// ```
pub fn find_domain(text: &str) -> Option<String> {
    let found = DOMAIN_REGEX.find(text)?;
    let domain = found.as_str().to_ascii_lowercase();
    if domain.len() > MAX_DOMAIN_LEN {
        return None;
    }
    Some(domain)
}

/// Returns true if `text` contains a domain-shaped substring
pub fn contains_domain(text: &str) -> bool {
    find_domain(text).is_some()
}

/// Returns the last label of a domain
pub fn tld_of(domain: &str) -> String {
    domain.rsplit('.').next().unwrap_or(domain).to_string()
}
