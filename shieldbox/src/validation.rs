//! Input validation for handler parameters.
//!
//! Rules are a closed set, so a rule list loaded from configuration either
//! names known rules or fails to deserialize:
//!
//! ```
//! use shieldbox::validation::{Rule, validate};
//!
//! let rules: Vec<Rule> = serde_json::from_str(r#"["required", {"max_length": 253}, "hostname"]"#)?;
//! assert!(validate("target", "example.com", &rules).is_ok());
//! assert!(validate("target", "exa mple.com", &rules).is_err());
//! assert!(serde_json::from_str::<Vec<Rule>>(r#"["shiny"]"#).is_err());
//! # Ok::<(), serde_json::Error>(())
//! ```

use std::net::IpAddr;

use http::Uri;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    /// Value must be present and not blank.
    Required,
    MinLength(usize),
    MaxLength(usize),
    Numeric,
    IpAddr,
    Hostname,
    /// Absolute `http` or `https` URL.
    Url,
    OneOf(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Missing { field: String },

    #[error("{field} must be at least {min} characters")]
    TooShort { field: String, min: usize },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    #[error("{field} must be numeric")]
    NotNumeric { field: String },

    #[error("{field} must be a valid IP address")]
    InvalidIpAddr { field: String },

    #[error("{field} must be a valid hostname")]
    InvalidHostname { field: String },

    #[error("{field} must be a valid http(s) URL")]
    InvalidUrl { field: String },

    #[error("{field} must be one of: {}", allowed.join(", "))]
    NotAllowed { field: String, allowed: Vec<String> },
}

impl ValidationError {
    pub fn field(&self) -> &str {
        match self {
            Self::Missing { field }
            | Self::TooShort { field, .. }
            | Self::TooLong { field, .. }
            | Self::NotNumeric { field }
            | Self::InvalidIpAddr { field }
            | Self::InvalidHostname { field }
            | Self::InvalidUrl { field }
            | Self::NotAllowed { field, .. } => field,
        }
    }
}

impl Rule {
    /// Checks one value. Blank values only fail [`Rule::Required`].
    pub fn check(&self, field: &str, value: &str) -> Result<(), ValidationError> {
        let field = || field.to_owned();
        if value.trim().is_empty() {
            return match self {
                Self::Required => Err(ValidationError::Missing { field: field() }),
                _ => Ok(()),
            };
        }

        let length = value.chars().count();
        match self {
            Self::Required => Ok(()),
            Self::MinLength(min) if length < *min => Err(ValidationError::TooShort {
                field: field(),
                min: *min,
            }),
            Self::MaxLength(max) if length > *max => Err(ValidationError::TooLong {
                field: field(),
                max: *max,
            }),
            Self::MinLength(_) | Self::MaxLength(_) => Ok(()),
            Self::Numeric if !is_numeric(value) => {
                Err(ValidationError::NotNumeric { field: field() })
            }
            Self::IpAddr if value.parse::<IpAddr>().is_err() => {
                Err(ValidationError::InvalidIpAddr { field: field() })
            }
            Self::Hostname if !is_hostname(value) => {
                Err(ValidationError::InvalidHostname { field: field() })
            }
            Self::Url if !is_http_url(value) => Err(ValidationError::InvalidUrl { field: field() }),
            Self::Numeric | Self::IpAddr | Self::Hostname | Self::Url => Ok(()),
            Self::OneOf(allowed) if !allowed.iter().any(|item| item == value) => {
                Err(ValidationError::NotAllowed {
                    field: field(),
                    allowed: allowed.clone(),
                })
            }
            Self::OneOf(_) => Ok(()),
        }
    }
}

/// Applies `rules` in order and returns the first failure.
pub fn validate(field: &str, value: &str, rules: &[Rule]) -> Result<(), ValidationError> {
    rules.iter().try_for_each(|rule| rule.check(field, value))
}

fn is_numeric(value: &str) -> bool {
    value.parse::<f64>().is_ok_and(f64::is_finite)
}

fn is_hostname(value: &str) -> bool {
    let value = value.strip_suffix('.').unwrap_or(value);
    !value.is_empty()
        && value.len() <= 253
        && value.split('.').all(|label| {
            (1..=63).contains(&label.len())
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label
                    .bytes()
                    .all(|byte| byte.is_ascii_alphanumeric() || byte == b'-')
        })
}

fn is_http_url(value: &str) -> bool {
    value.parse::<Uri>().is_ok_and(|uri| {
        matches!(uri.scheme_str(), Some("http" | "https"))
            && uri.host().is_some_and(|host| !host.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required() {
        assert_eq!(
            validate("host", "  ", &[Rule::Required, Rule::Hostname]),
            Err(ValidationError::Missing {
                field: "host".to_owned()
            })
        );
        // Optional fields may be blank.
        assert!(validate("host", "", &[Rule::Hostname]).is_ok());
    }

    #[test]
    fn test_lengths_count_chars() {
        let rules = [Rule::MinLength(2), Rule::MaxLength(3)];
        assert!(validate("name", "héé", &rules).is_ok());
        assert!(matches!(
            validate("name", "h", &rules),
            Err(ValidationError::TooShort { min: 2, .. })
        ));
        assert!(matches!(
            validate("name", "héllo", &rules),
            Err(ValidationError::TooLong { max: 3, .. })
        ));
    }

    #[test]
    fn test_formats() {
        assert!(Rule::Numeric.check("n", "42.5").is_ok());
        assert!(Rule::Numeric.check("n", "NaN").is_err());
        assert!(Rule::IpAddr.check("ip", "2001:db8::1").is_ok());
        assert!(Rule::IpAddr.check("ip", "999.1.1.1").is_err());
        assert!(Rule::Hostname.check("h", "api.example.com").is_ok());
        assert!(Rule::Hostname.check("h", "-bad.example.com").is_err());
        assert!(Rule::Hostname.check("h", "a..b").is_err());
        assert!(Rule::Url.check("u", "https://example.com/feed?x=1").is_ok());
        assert!(Rule::Url.check("u", "ftp://example.com").is_err());
        assert!(Rule::Url.check("u", "/relative").is_err());
    }

    #[test]
    fn test_one_of() {
        let rule = Rule::OneOf(vec!["ping".to_owned(), "dns".to_owned()]);
        assert!(rule.check("tool", "dns").is_ok());

        let error = rule.check("tool", "nmap").unwrap_err();
        assert_eq!(error.field(), "tool");
        assert_eq!(error.to_string(), "tool must be one of: ping, dns");
    }

    #[test]
    fn test_rules_from_config() {
        let rules: Vec<Rule> =
            serde_json::from_str(r#"["required", {"min_length": 3}, {"one_of": ["a", "b"]}]"#)
                .unwrap();
        assert_eq!(
            rules,
            vec![
                Rule::Required,
                Rule::MinLength(3),
                Rule::OneOf(vec!["a".to_owned(), "b".to_owned()])
            ]
        );
    }
}
