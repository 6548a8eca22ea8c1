//! Lenient deserializers for Scopus JSON.
//!
//! The API sends most numbers as strings and occasionally sends `null` where
//! a list is expected.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Accept a string, number or null as an optional string.
pub fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// Accept `"12"`, `12` or null as an optional unsigned count.
pub fn opt_count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => s.trim().parse().ok(),
        Some(Value::Number(n)) => n.as_u64(),
        _ => None,
    })
}

/// Treat an explicit `null` the same as a missing field.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Sample {
        #[serde(default, deserialize_with = "opt_string")]
        text: Option<String>,
        #[serde(default, deserialize_with = "opt_count")]
        count: Option<u64>,
        #[serde(default, deserialize_with = "null_as_default")]
        items: Vec<String>,
    }

    #[test]
    fn test_string_numbers() {
        let s: Sample = serde_json::from_str(r#"{"text": 42, "count": "17"}"#).unwrap();
        assert_eq!(s.text.as_deref(), Some("42"));
        assert_eq!(s.count, Some(17));
        assert!(s.items.is_empty());
    }

    #[test]
    fn test_nulls() {
        let s: Sample =
            serde_json::from_str(r#"{"text": null, "count": "n/a", "items": null}"#).unwrap();
        assert_eq!(s.text, None);
        assert_eq!(s.count, None);
        assert!(s.items.is_empty());
    }
}
