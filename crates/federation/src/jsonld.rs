//! Minimal JSON-LD compaction and canonical serialization.
//!
//! This server does not implement general JSON-LD expansion. Inbound
//! documents are compacted over the context terms we actually consume,
//! and LD signatures hash a deterministic sorted-key serialization of
//! the compacted form.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

/// Date fields normalized during canonicalization.
const DATE_TERMS: &[&str] = &["published", "updated", "created", "deleted"];

/// How date-valued terms are treated while canonicalizing.
///
/// Lenient mode forgives sloppy remote timestamps by reformatting
/// anything parseable; strict mode leaves every string byte-exact so
/// both signing sides hash identical input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateHandling {
    Strict,
    Lenient,
}

/// Compact an inbound document over the known context terms.
///
/// Collapses `@id`/`@type` keyword forms and unwraps single-element
/// arrays for functional terms, which is all the variation the handled
/// activity kinds produce in practice.
#[must_use]
pub fn compact(document: &Value) -> Value {
    match document {
        Value::Object(obj) => {
            let mut out = Map::with_capacity(obj.len());
            for (key, value) in obj {
                let key = match key.as_str() {
                    "@id" => "id",
                    "@type" => "type",
                    k => k,
                };
                let value = if is_functional_term(key) {
                    unwrap_singleton(compact(value))
                } else {
                    compact(value)
                };
                out.insert(key.to_string(), value);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(compact).collect()),
        other => other.clone(),
    }
}

/// Serialize a document deterministically: object keys sorted, arrays
/// kept in order, date terms per the given handling.
#[must_use]
pub fn canonicalize(document: &Value, dates: DateHandling) -> String {
    let mut out = String::new();
    write_canonical(document, dates, false, &mut out);
    out
}

fn write_canonical(value: &Value, dates: DateHandling, date_position: bool, out: &mut String) {
    match value {
        Value::Object(obj) => {
            let mut keys: Vec<&String> = obj.keys().collect();
            keys.sort();
            out.push('{');
            for (index, key) in keys.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                let is_date = DATE_TERMS.contains(&key.as_str());
                write_canonical(&obj[*key], dates, is_date, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, dates, date_position, out);
            }
            out.push(']');
        }
        Value::String(s) if date_position && dates == DateHandling::Lenient => {
            let normalized = normalize_date(s).unwrap_or_else(|| s.clone());
            out.push_str(&Value::String(normalized).to_string());
        }
        other => out.push_str(&other.to_string()),
    }
}

/// Reformat a parseable timestamp; `None` when it is not one.
fn normalize_date(raw: &str) -> Option<String> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .or_else(|| DateTime::parse_from_rfc2822(raw).ok())
        .map(|dt| {
            dt.with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Secs, true)
        })
}

fn is_functional_term(key: &str) -> bool {
    matches!(key, "id" | "type" | "actor" | "object" | "target")
}

fn unwrap_singleton(value: Value) -> Value {
    match value {
        Value::Array(mut items) if items.len() == 1 => items.remove(0),
        other => other,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_compact_keyword_keys() {
        let doc = json!({
            "@id": "https://a.example/activities/1",
            "@type": ["Create"],
            "actor": ["https://a.example/users/1"]
        });

        let compacted = compact(&doc);
        assert_eq!(compacted["id"], "https://a.example/activities/1");
        assert_eq!(compacted["type"], "Create");
        assert_eq!(compacted["actor"], "https://a.example/users/1");
    }

    #[test]
    fn test_compact_keeps_addressing_lists() {
        let doc = json!({"to": ["https://a.example/u/1", "https://a.example/u/2"]});
        let compacted = compact(&doc);
        assert!(compacted["to"].is_array());
    }

    #[test]
    fn test_canonical_keys_sorted() {
        let doc = json!({"b": 1, "a": {"z": true, "m": null}});
        let canonical = canonicalize(&doc, DateHandling::Strict);
        assert_eq!(canonical, r#"{"a":{"m":null,"z":true},"b":1}"#);
    }

    #[test]
    fn test_canonical_is_stable() {
        let doc = json!({"type": "Create", "actor": "https://a.example/users/1"});
        let first = canonicalize(&doc, DateHandling::Strict);
        let second = canonicalize(&doc, DateHandling::Strict);
        assert_eq!(first, second);
    }

    #[test]
    fn test_lenient_normalizes_dates() {
        let doc = json!({"published": "2024-05-01T10:00:00.000+00:00"});
        let canonical = canonicalize(&doc, DateHandling::Lenient);
        assert_eq!(canonical, r#"{"published":"2024-05-01T10:00:00Z"}"#);
    }

    #[test]
    fn test_strict_leaves_dates_untouched() {
        let doc = json!({"published": "2024-05-01T10:00:00.000+00:00"});
        let canonical = canonicalize(&doc, DateHandling::Strict);
        assert_eq!(canonical, r#"{"published":"2024-05-01T10:00:00.000+00:00"}"#);
    }

    #[test]
    fn test_unparseable_date_is_kept() {
        let doc = json!({"published": "yesterday-ish"});
        let canonical = canonicalize(&doc, DateHandling::Lenient);
        assert_eq!(canonical, r#"{"published":"yesterday-ish"}"#);
    }
}
