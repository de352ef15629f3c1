//! API request/response models for messaging instances.

use crate::errors::{Error, Result};
use crate::models::instances::Instance;
use crate::sync::pairing::PairingState;
use serde::{Deserialize, Serialize};

/// Request body for creating a new instance.
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceCreate {
    /// Name used at the gateway; must be unique and URL-path safe
    pub name: String,
    /// Phone number to pair with, when pairing by code instead of image
    #[serde(default)]
    pub phone: Option<String>,
}

impl InstanceCreate {
    /// Trim inputs and reject names the gateway's path-based endpoints cannot address.
    pub fn normalized(self) -> Result<Self> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::bad_request("Instance name must not be empty"));
        }
        if name.contains('/') {
            return Err(Error::bad_request("Instance name must not contain '/'"));
        }
        let phone = self.phone.map(|p| p.trim().to_string()).filter(|p| !p.is_empty());
        Ok(Self { name, phone })
    }
}

/// An instance together with its current pairing state.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceResponse {
    #[serde(flatten)]
    pub instance: Instance,
    pub pairing: PairingState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadResponse {
    pub loaded: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileResponse {
    pub updated: usize,
}
