use crate::models::{deserialize_optional_datetime, deserialize_optional_text, deserialize_text};
use crate::types::{InstanceStatus, RowId, deserialize_opaque_id};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A messaging instance as stored in the instances table.
///
/// `status` mirrors what the gateway last reported. It is written once when the row is inserted;
/// afterwards only the in-memory copy is kept fresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    #[serde(deserialize_with = "deserialize_opaque_id")]
    pub id: RowId,
    #[serde(deserialize_with = "deserialize_text")]
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_optional_text")]
    pub phone: Option<String>,
    /// The gateway's own id for the instance, which survives a rename at the gateway
    #[serde(default, deserialize_with = "deserialize_optional_text")]
    pub gateway_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_status")]
    pub status: InstanceStatus,
    #[serde(default, deserialize_with = "deserialize_optional_datetime")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_optional_datetime")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Row written when a new instance is inserted.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceCreateRow {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_id: Option<String>,
    pub status: InstanceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InstanceCreateRow {
    pub fn new(name: String, phone: Option<String>, gateway_id: Option<String>, status: InstanceStatus) -> Self {
        let now = Utc::now();
        Self {
            name,
            phone,
            gateway_id,
            status,
            created_at: now,
            updated_at: now,
        }
    }
}

fn deserialize_status<'de, D>(deserializer: D) -> Result<InstanceStatus, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserialize_optional_text(deserializer)?
        .map(|raw| InstanceStatus::from_gateway(&raw))
        .unwrap_or_default())
}
