//! API request/response models for the settings singleton.

use crate::errors::{Error, Result};
use crate::models::settings::{Settings, SettingsUpdate};
use crate::types::RowId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Request body for saving settings. Omitted fields are left unchanged; an empty string clears a
/// field.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsSave {
    pub gateway_base_url: Option<String>,
    pub gateway_api_key: Option<String>,
    pub default_instance_id: Option<RowId>,
}

impl SettingsSave {
    /// Validate the request and turn it into a row update.
    pub fn into_update(self) -> Result<SettingsUpdate> {
        let gateway_base_url = match self.gateway_base_url.map(|s| s.trim().to_string()) {
            Some(raw) if !raw.is_empty() => {
                let url = raw
                    .parse::<Url>()
                    .map_err(|e| Error::bad_request(format!("Invalid gateway base URL: {e}")))?;
                if !matches!(url.scheme(), "http" | "https") {
                    return Err(Error::bad_request("Gateway base URL must use http or https"));
                }
                Some(raw)
            }
            other => other,
        };

        let update = SettingsUpdate {
            gateway_base_url,
            gateway_api_key: self.gateway_api_key.map(|s| s.trim().to_string()),
            default_instance_id: self.default_instance_id.map(|s| s.trim().to_string()),
        };
        if update.is_empty() {
            return Err(Error::bad_request("Nothing to update"));
        }
        Ok(update)
    }
}

/// Settings as shown to operators. The API key is masked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsResponse {
    pub id: Option<RowId>,
    pub gateway_base_url: Option<String>,
    pub gateway_api_key: Option<String>,
    pub gateway_api_key_set: bool,
    pub default_instance_id: Option<RowId>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<Option<Settings>> for SettingsResponse {
    fn from(settings: Option<Settings>) -> Self {
        let Some(settings) = settings else {
            return Self::default();
        };
        Self {
            id: Some(settings.id),
            gateway_base_url: settings.gateway_base_url,
            gateway_api_key_set: settings.gateway_api_key.is_some(),
            gateway_api_key: settings.gateway_api_key.as_deref().map(mask_api_key),
            default_instance_id: settings.default_instance_id,
            updated_at: settings.updated_at,
        }
    }
}

/// Keep only the last four characters, and none of a short key.
pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "********".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("********{tail}")
}
