//! Versioned configuration value and its wire codec
//!
//! The shared configuration is a flat string-to-string map stamped with an
//! integer version. On the wire it is a line-oriented `key=value` text blob
//! with a `#` comment header; the version travels separately as decimal text.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use warden_common::{Result, WardenError};

/// A snapshot of the shared configuration: the properties map plus the
/// version under which it was stored.
///
/// `version` increases by exactly 1 on every successful store and uniquely
/// identifies a stored snapshot within one backend namespace. Version 0 means
/// "nothing stored yet".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedProperties {
    pub properties: BTreeMap<String, String>,
    pub version: i64,
}

impl VersionedProperties {
    /// The state of a namespace nothing has been stored into.
    pub fn empty() -> Self {
        Self {
            properties: BTreeMap::new(),
            version: 0,
        }
    }

    pub fn new(properties: BTreeMap<String, String>, version: i64) -> Self {
        Self {
            properties,
            version,
        }
    }

    /// Value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

/// Merge locally supplied defaults under a stored map. Stored values win.
pub fn merge_defaults(
    stored: BTreeMap<String, String>,
    defaults: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = defaults.clone();
    merged.extend(stored);
    merged
}

/// Reject keys the line-oriented codec cannot represent.
pub fn validate_keys(properties: &BTreeMap<String, String>) -> Result<()> {
    for key in properties.keys() {
        if key.is_empty() || key.contains('=') || key.contains('\n') || key.contains('\r') {
            return Err(WardenError::InvalidKey(key.clone()));
        }
    }
    for value in properties.values() {
        if value.contains('\n') || value.contains('\r') {
            return Err(WardenError::IllegalArgument(
                "property values must not contain newlines".to_string(),
            ));
        }
    }
    Ok(())
}

/// Serialize a properties map to the stored payload format.
///
/// One `key=value` line per entry in key order, preceded by a generator
/// header comment. The whole blob replaces the previous payload on store.
pub fn serialize_properties(properties: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    out.push_str("# generated by warden at ");
    out.push_str(&Utc::now().to_rfc3339());
    out.push('\n');
    for (key, value) in properties {
        out.push_str(key);
        out.push('=');
        out.push_str(value);
        out.push('\n');
    }
    out
}

/// Parse a stored payload back into a properties map.
///
/// Blank lines and `#` comments are skipped. A remaining line without `=` is
/// a `ParseError`; it is surfaced, never treated as empty.
pub fn parse_properties(raw: &str, key: &str) -> Result<BTreeMap<String, String>> {
    let mut properties = BTreeMap::new();
    for line in raw.lines() {
        let line = line.trim_end_matches('\r');
        // Comment lines may be indented in hand-edited payloads.
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match line.split_once('=') {
            Some((k, v)) => {
                properties.insert(k.to_string(), v.to_string());
            }
            None => {
                return Err(WardenError::ParseError {
                    key: key.to_string(),
                    message: format!("line without '=': {line:?}"),
                });
            }
        }
    }
    Ok(properties)
}

/// Parse the decimal version counter. Absent reads as 0.
pub fn parse_version(raw: Option<&str>, key: &str) -> Result<i64> {
    match raw {
        None => Ok(0),
        Some(text) => text
            .trim()
            .parse::<i64>()
            .map_err(|_| WardenError::ParseError {
                key: key.to_string(),
                message: format!("not a decimal integer: {text:?}"),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_serialize_then_parse() {
        let props = map(&[("servers", "1:a,2:b"), ("tick.time", "2000"), ("empty", "")]);
        let raw = serialize_properties(&props);
        assert!(raw.starts_with("# generated by warden"));
        let parsed = parse_properties(&raw, "ns/properties").unwrap();
        assert_eq!(parsed, props);
    }

    #[test]
    fn test_value_may_contain_equals() {
        let parsed = parse_properties("jvm.flags=-Xmx=512m\n", "k").unwrap();
        assert_eq!(parsed.get("jvm.flags").map(String::as_str), Some("-Xmx=512m"));
    }

    #[test]
    fn test_malformed_line_is_a_parse_error_not_empty() {
        let err = parse_properties("servers\n", "ns/properties").unwrap_err();
        assert!(matches!(err, WardenError::ParseError { .. }));
    }

    #[test]
    fn test_crlf_payload() {
        let parsed = parse_properties("# hdr\r\na=1\r\n\r\n", "k").unwrap();
        assert_eq!(parsed, map(&[("a", "1")]));
    }

    #[test]
    fn test_indented_comment_lines_are_skipped() {
        let parsed = parse_properties("  # note from an operator\n\t# another\na=1\n", "k").unwrap();
        assert_eq!(parsed, map(&[("a", "1")]));
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version(None, "v").unwrap(), 0);
        assert_eq!(parse_version(Some("17\n"), "v").unwrap(), 17);
        assert!(parse_version(Some("abc"), "v").is_err());
    }

    #[test]
    fn test_defaults_fill_absent_keys_only() {
        let stored = map(&[("a", "stored")]);
        let defaults = map(&[("a", "default"), ("b", "default")]);
        let merged = merge_defaults(stored, &defaults);
        assert_eq!(merged, map(&[("a", "stored"), ("b", "default")]));
    }

    #[test]
    fn test_key_validation() {
        assert!(validate_keys(&map(&[("ok.key", "v")])).is_ok());
        assert!(matches!(
            validate_keys(&map(&[("bad=key", "v")])),
            Err(WardenError::InvalidKey(_))
        ));
        assert!(validate_keys(&map(&[("k", "line1\nline2")])).is_err());
    }
}
