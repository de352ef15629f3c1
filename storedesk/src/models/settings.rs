use crate::models::{deserialize_optional_datetime, deserialize_optional_text};
use crate::types::{RowId, deserialize_opaque_id, deserialize_optional_opaque_id};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The settings singleton.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(deserialize_with = "deserialize_opaque_id")]
    pub id: RowId,
    #[serde(default, deserialize_with = "deserialize_optional_text")]
    pub gateway_base_url: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_text")]
    pub gateway_api_key: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_opaque_id")]
    pub default_instance_id: Option<RowId>,
    #[serde(default, deserialize_with = "deserialize_optional_datetime")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_optional_datetime")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Fields to change on save. `None` leaves a field as it is; an empty string clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_instance_id: Option<RowId>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        self.gateway_base_url.is_none() && self.gateway_api_key.is_none() && self.default_instance_id.is_none()
    }
}
