//! Common type definitions shared by the clients, stores and API layer.
//!
//! # ID Types
//!
//! - [`RowId`]: opaque row identifier / foreign key as handed out by the table store
//! - [`TableId`]: numeric table identifier of the table store
//!
//! # Instance status
//!
//! [`InstanceStatus`] is a client-side mirror of what the messaging gateway reports. It is never
//! computed locally; [`InstanceStatus::from_gateway`] is the only way a gateway string turns into a
//! status.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Row identifiers are opaque strings copied between calls. The table store hands out numbers,
/// which are normalised to their decimal form.
pub type RowId = String;

/// Table identifiers are plain numbers in the table store's URL space.
pub type TableId = u64;

/// Connection status of a messaging instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Connected,
    Connecting,
    Disconnected,
    Error,
    #[default]
    Unknown,
}

impl InstanceStatus {
    /// Map a gateway-reported `connectionStatus` / `state` string onto a local status.
    ///
    /// `open` means connected and `close` means disconnected. Any other value is taken by name,
    /// so a gateway reporting `connecting` yields [`InstanceStatus::Connecting`]. Values that name
    /// no status at all end up as [`InstanceStatus::Unknown`].
    pub fn from_gateway(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("open") {
            return Self::Connected;
        }
        if raw.eq_ignore_ascii_case("close") {
            return Self::Disconnected;
        }
        raw.parse().unwrap_or_else(|_| {
            tracing::debug!(status = raw, "Gateway reported an unrecognised connection status");
            Self::Unknown
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Connecting => "connecting",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown instance status '{}'", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for InstanceStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "connected" => Ok(Self::Connected),
            "connecting" => Ok(Self::Connecting),
            "disconnected" => Ok(Self::Disconnected),
            "error" => Ok(Self::Error),
            "unknown" => Ok(Self::Unknown),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

/// Accept a row id that arrives either as a JSON number or a string.
pub fn deserialize_opaque_id<'de, D>(deserializer: D) -> Result<RowId, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("expected string or number id, got {other}"))),
    }
}

/// Like [`deserialize_opaque_id`] but for optional foreign keys; empty strings count as absent.
pub fn deserialize_optional_opaque_id<'de, D>(deserializer: D) -> Result<Option<RowId>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) if s.is_empty() => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!("expected string or number id, got {other}"))),
    }
}
