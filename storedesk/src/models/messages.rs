use crate::models::{deserialize_optional_datetime, deserialize_optional_text, deserialize_text};
use crate::types::{RowId, deserialize_opaque_id, deserialize_optional_opaque_id};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status recorded for messages handed to the gateway's scheduler.
pub const SCHEDULED_STATUS: &str = "scheduled";

/// A sent (or scheduled) message.
///
/// Rows are append-only: `status` is whatever the gateway reported when the message was handed
/// over and is never refreshed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(deserialize_with = "deserialize_opaque_id")]
    pub id: RowId,
    #[serde(default, deserialize_with = "deserialize_optional_opaque_id")]
    pub instance_id: Option<RowId>,
    #[serde(deserialize_with = "deserialize_text")]
    pub to: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub body: String,
    #[serde(rename = "type", default, deserialize_with = "deserialize_text")]
    pub kind: String,
    #[serde(default, deserialize_with = "deserialize_optional_text")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_text")]
    pub gateway_message_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_datetime")]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_optional_datetime")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageCreateRow {
    pub instance_id: RowId,
    pub to: String,
    pub body: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
