//! Tenant slug value object.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum slug length in characters.
pub const MIN_SLUG_LEN: usize = 3;

/// Maximum slug length in characters.
pub const MAX_SLUG_LEN: usize = 48;

const SEPARATOR: char = '-';

/// Slugs that collide with platform hostnames and routes.
const RESERVED_SLUGS: &[&str] = &[
    "admin", "api", "app", "www", "auth", "login", "static", "assets", "mail", "support", "status",
];

/// Suffix appended to derived slugs that are too short or reserved.
const FALLBACK_SUFFIX: &str = "store";

/// Errors produced when a candidate slug fails validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlugError {
    /// The candidate was empty after trimming.
    #[error("Slug must not be empty")]
    Empty,

    /// The candidate is shorter than the minimum length.
    #[error("Slug is too short: {len} characters (minimum {min})")]
    TooShort { len: usize, min: usize },

    /// The candidate is longer than the maximum length.
    #[error("Slug is too long: {len} characters (maximum {max})")]
    TooLong { len: usize, max: usize },

    /// The candidate contains a character outside `[a-z0-9-]`.
    #[error("Slug contains invalid character '{0}'")]
    InvalidCharacter(char),

    /// The candidate starts or ends with a separator.
    #[error("Slug must start and end with a letter or digit")]
    InvalidBoundary,

    /// The candidate contains two separators in a row.
    #[error("Slug must not contain consecutive separators")]
    ConsecutiveSeparators,

    /// The candidate is a reserved platform word.
    #[error("Slug '{0}' is reserved")]
    Reserved(String),
}

/// The unique, human-readable identifier a tenant is reachable by.
///
/// A `Slug` is always valid: lower-case ASCII letters, digits and single
/// separators, between [`MIN_SLUG_LEN`] and [`MAX_SLUG_LEN`] characters long.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Slug(String);

impl Slug {
    /// Normalizes (trim + lower-case) and validates a candidate slug.
    pub fn parse(candidate: &str) -> Result<Self, SlugError> {
        let normalized = candidate.trim().to_ascii_lowercase();
        validate(&normalized)?;
        Ok(Self(normalized))
    }

    /// Derives a slug from a free-form business name.
    ///
    /// Runs of non-alphanumeric characters collapse into a single separator.
    /// Results that are too short or reserved get a `-store` suffix.
    pub fn from_business_name(name: &str) -> Result<Self, SlugError> {
        let mut derived = String::with_capacity(name.len());
        for c in name.trim().chars() {
            if c.is_ascii_alphanumeric() {
                derived.push(c.to_ascii_lowercase());
            } else if !derived.is_empty() && !derived.ends_with(SEPARATOR) {
                derived.push(SEPARATOR);
            }
        }

        let mut derived = truncate(&derived, MAX_SLUG_LEN);
        if derived.is_empty() {
            derived = FALLBACK_SUFFIX.to_string();
        } else if derived.len() < MIN_SLUG_LEN || RESERVED_SLUGS.contains(&derived.as_str()) {
            let base = truncate(&derived, MAX_SLUG_LEN - FALLBACK_SUFFIX.len() - 1);
            derived = format!("{base}{SEPARATOR}{FALLBACK_SUFFIX}");
        }

        Self::parse(&derived)
    }

    /// Returns `base-n`, truncating the base so the result fits the maximum length.
    pub fn with_suffix(&self, n: u32) -> Slug {
        let suffix = format!("{SEPARATOR}{n}");
        let base = truncate(&self.0, MAX_SLUG_LEN.saturating_sub(suffix.len()));
        Slug(format!("{base}{suffix}"))
    }

    /// Returns an endless sequence of suffixed alternatives: `base-1`, `base-2`, ...
    pub fn alternatives(&self) -> impl Iterator<Item = Slug> + '_ {
        (1..).map(move |n| self.with_suffix(n))
    }

    /// Returns the slug as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate(candidate: &str) -> Result<(), SlugError> {
    if candidate.is_empty() {
        return Err(SlugError::Empty);
    }

    let len = candidate.chars().count();
    if len < MIN_SLUG_LEN {
        return Err(SlugError::TooShort {
            len,
            min: MIN_SLUG_LEN,
        });
    }
    if len > MAX_SLUG_LEN {
        return Err(SlugError::TooLong {
            len,
            max: MAX_SLUG_LEN,
        });
    }

    if let Some(bad) = candidate
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == SEPARATOR))
    {
        return Err(SlugError::InvalidCharacter(bad));
    }

    if candidate.starts_with(SEPARATOR) || candidate.ends_with(SEPARATOR) {
        return Err(SlugError::InvalidBoundary);
    }

    if candidate.contains("--") {
        return Err(SlugError::ConsecutiveSeparators);
    }

    if RESERVED_SLUGS.contains(&candidate) {
        return Err(SlugError::Reserved(candidate.to_string()));
    }

    Ok(())
}

/// Truncates an ASCII slug body and strips any trailing separator left behind.
fn truncate(s: &str, max: usize) -> String {
    let cut: String = s.chars().take(max).collect();
    cut.trim_end_matches(SEPARATOR).to_string()
}

impl std::fmt::Display for Slug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Slug {
    type Error = SlugError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Slug::parse(&value)
    }
}

impl TryFrom<&str> for Slug {
    type Error = SlugError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Slug::parse(value)
    }
}

impl From<Slug> for String {
    fn from(slug: Slug) -> Self {
        slug.0
    }
}

impl AsRef<str> for Slug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        let slug = Slug::parse("acme-shop-2").unwrap();
        assert_eq!(slug.as_str(), "acme-shop-2");
    }

    #[test]
    fn test_parse_normalizes_case_and_whitespace() {
        let slug = Slug::parse("  Acme  ").unwrap();
        assert_eq!(slug.as_str(), "acme");
    }

    #[test]
    fn test_parse_length_bounds() {
        assert_eq!(Slug::parse(""), Err(SlugError::Empty));
        assert_eq!(
            Slug::parse("ab"),
            Err(SlugError::TooShort { len: 2, min: 3 })
        );
        assert!(Slug::parse("abc").is_ok());
        assert!(Slug::parse(&"a".repeat(MAX_SLUG_LEN)).is_ok());
        assert_eq!(
            Slug::parse(&"a".repeat(MAX_SLUG_LEN + 1)),
            Err(SlugError::TooLong { len: 49, max: 48 })
        );
    }

    #[test]
    fn test_parse_rejects_bad_characters() {
        assert_eq!(
            Slug::parse("acme_shop"),
            Err(SlugError::InvalidCharacter('_'))
        );
        assert_eq!(
            Slug::parse("acme.shop"),
            Err(SlugError::InvalidCharacter('.'))
        );
        assert_eq!(Slug::parse("café"), Err(SlugError::InvalidCharacter('é')));
    }

    #[test]
    fn test_parse_rejects_separator_placement() {
        assert_eq!(Slug::parse("-acme"), Err(SlugError::InvalidBoundary));
        assert_eq!(Slug::parse("acme-"), Err(SlugError::InvalidBoundary));
        assert_eq!(
            Slug::parse("acme--shop"),
            Err(SlugError::ConsecutiveSeparators)
        );
    }

    #[test]
    fn test_parse_rejects_reserved() {
        assert_eq!(
            Slug::parse("admin"),
            Err(SlugError::Reserved("admin".to_string()))
        );
        assert!(Slug::parse("admin-team").is_ok());
    }

    #[test]
    fn test_from_business_name() {
        assert_eq!(
            Slug::from_business_name("Acme Widgets, Inc.").unwrap().as_str(),
            "acme-widgets-inc"
        );
        assert_eq!(
            Slug::from_business_name("  Joe's   Café ").unwrap().as_str(),
            "joe-s-caf"
        );
    }

    #[test]
    fn test_from_business_name_pads_short_and_reserved() {
        assert_eq!(Slug::from_business_name("Q").unwrap().as_str(), "q-store");
        assert_eq!(Slug::from_business_name("API").unwrap().as_str(), "api-store");
        assert_eq!(Slug::from_business_name("!!!").unwrap().as_str(), "store");
    }

    #[test]
    fn test_from_business_name_truncates() {
        let name = "word ".repeat(20);
        let slug = Slug::from_business_name(&name).unwrap();
        assert!(slug.as_str().len() <= MAX_SLUG_LEN);
        assert!(!slug.as_str().ends_with('-'));
    }

    #[test]
    fn test_with_suffix() {
        let slug = Slug::parse("acme").unwrap();
        assert_eq!(slug.with_suffix(1).as_str(), "acme-1");
        assert_eq!(slug.with_suffix(12).as_str(), "acme-12");
    }

    #[test]
    fn test_with_suffix_keeps_max_length() {
        // Truncation lands right after the separator, which must be stripped.
        let long = Slug::parse(&format!("{}-bc", "a".repeat(MAX_SLUG_LEN - 3))).unwrap();
        let suffixed = long.with_suffix(7);
        assert_eq!(suffixed.as_str().len(), MAX_SLUG_LEN - 1);
        assert!(Slug::parse(suffixed.as_str()).is_ok());
        assert!(!suffixed.as_str().contains("--"));
    }

    #[test]
    fn test_alternatives() {
        let slug = Slug::parse("acme").unwrap();
        let alts: Vec<String> = slug
            .alternatives()
            .take(3)
            .map(String::from)
            .collect();
        assert_eq!(alts, vec!["acme-1", "acme-2", "acme-3"]);
    }

    #[test]
    fn test_serde_validates() {
        let slug: Slug = serde_json::from_str("\"acme\"").unwrap();
        assert_eq!(slug.as_str(), "acme");
        assert!(serde_json::from_str::<Slug>("\"a--b\"").is_err());
        assert_eq!(serde_json::to_string(&slug).unwrap(), "\"acme\"");
    }
}
