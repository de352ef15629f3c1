//! Row shapes stored in the table store.
//!
//! Each model decodes from a flat [`Row`](crate::clients::Row) and encodes back into one. Decoding
//! is lenient in the ways hosted table stores tend to need: numeric ids become strings, empty
//! strings count as absent and single-select cells (`{"id": 1, "value": "connected"}`) are
//! flattened to their value.

pub mod content;
pub mod instances;
pub mod messages;
pub mod settings;

use crate::clients::{ClientError, Row, Service};
use crate::errors::Error;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Decode a table-store row into a typed model.
pub fn decode_row<T: DeserializeOwned>(row: Row) -> Result<T, ClientError> {
    serde_json::from_value(Value::Object(row)).map_err(|e| ClientError::decode(Service::TableStore, e))
}

/// Decode every row, failing on the first row that does not fit.
pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Row>) -> Result<Vec<T>, ClientError> {
    rows.into_iter().map(decode_row).collect()
}

/// Encode a model into a flat row.
pub fn encode_row<T: Serialize>(value: &T) -> Result<Row, Error> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(Error::Internal {
            operation: format!("encode row: expected an object, got {other}"),
        }),
        Err(e) => Err(Error::Internal {
            operation: format!("encode row: {e}"),
        }),
    }
}

/// Single-select cells arrive as `{"id": .., "value": ".."}`; plain cells as strings.
fn cell_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(mut map) => map.remove("value").and_then(cell_text),
        _ => None,
    }
}

pub(crate) fn deserialize_optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?.and_then(cell_text))
}

pub(crate) fn deserialize_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserialize_optional_text(deserializer)?.unwrap_or_default())
}

pub(crate) fn deserialize_optional_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match deserialize_optional_text(deserializer)? {
        None => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| serde::de::Error::custom(format!("invalid timestamp '{raw}': {e}"))),
    }
}
