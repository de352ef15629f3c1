//! API request models for sending messages.

use crate::errors::{Error, Result};
use crate::types::RowId;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Request body for sending (or scheduling) a text message.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageSend {
    /// Instance to send from; the settings' default instance when omitted
    #[serde(default)]
    pub instance_id: Option<RowId>,
    /// Recipient number
    pub to: String,
    pub body: String,
    /// Hand the message to the gateway's scheduler instead of sending now
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl MessageSend {
    pub fn validate(&self, now: DateTime<Utc>) -> Result<()> {
        if self.to.trim().is_empty() {
            return Err(Error::bad_request("Recipient must not be empty"));
        }
        if self.body.trim().is_empty() {
            return Err(Error::bad_request("Message body must not be empty"));
        }
        if let Some(at) = self.scheduled_at
            && at <= now
        {
            return Err(Error::bad_request("scheduled_at must be in the future"));
        }
        Ok(())
    }
}

/// Query parameters for listing messages.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListMessagesQuery {
    pub instance_id: Option<RowId>,
}
