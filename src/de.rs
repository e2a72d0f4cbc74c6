//! Tolerant serde helpers for data written by older builds or sent by the
//! vendor API, where ids flip between numbers and strings and timestamps are
//! not always valid.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serializer};
use serde_json::Value;

/// Optional RFC 3339 timestamp. Anything unparsable loads as `None`.
pub mod lenient_timestamp {
    use super::*;

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_some(&ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<Value>::deserialize(deserializer)?;
        Ok(match raw {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => match DateTime::parse_from_rfc3339(&s) {
                Ok(ts) => Some(ts.with_timezone(&Utc)),
                Err(e) => {
                    log::warn!("[store] Invalid timestamp {:?} ({}), resetting to null", s, e);
                    None
                }
            },
            Some(other) => {
                log::warn!("[store] Invalid timestamp {}, resetting to null", other);
                None
            }
        })
    }
}

/// Identifier that may arrive as a JSON number or string; always kept as a
/// trimmed string.
pub mod loose_string {
    use super::*;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(s.trim().to_string()),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(serde::de::Error::custom(format!(
                "expected a string or number, got {}",
                other
            ))),
        }
    }
}

/// Like [`loose_string`] but nullable; other JSON types load as `None`.
pub mod loose_opt_string {
    use super::*;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<Value>::deserialize(deserializer)?.and_then(value_to_string))
    }
}

/// Stringify a scalar JSON value; `null`, arrays and objects yield `None`.
pub fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
