//! Client for the messaging gateway.
//!
//! The gateway owns instance lifecycle (create, connect/pair, connection state) and message
//! dispatch. Every request carries an `apikey` header. Credentials come from the settings
//! singleton, so callers obtain a client through a [`GatewayProvider`] rather than holding one.

use crate::clients::{ClientError, Service, join_url, read_json};
use crate::errors::Error;
use crate::store::SettingsStore;
use crate::types::{InstanceStatus, deserialize_optional_opaque_id};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};
use url::Url;

const SERVICE: Service = Service::Gateway;

/// One entry of `GET /instance/fetchInstances`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayInstance {
    #[serde(default, deserialize_with = "deserialize_optional_opaque_id")]
    pub id: Option<String>,
    #[serde(alias = "instanceName")]
    pub name: String,
    /// Raw connection status: `open`, `close` or anything else the gateway reports
    #[serde(default)]
    pub connection_status: Option<String>,
    #[serde(default)]
    pub number: Option<String>,
}

impl GatewayInstance {
    pub fn new(name: impl Into<String>, connection_status: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            connection_status: Some(connection_status.into()),
            number: None,
        }
    }

    pub fn status(&self) -> InstanceStatus {
        self.connection_status
            .as_deref()
            .map(InstanceStatus::from_gateway)
            .unwrap_or(InstanceStatus::Unknown)
    }
}

/// Pairing material returned by connect and create.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingCode {
    /// Scannable image, usually a `data:image/png;base64,...` URI
    #[serde(default)]
    pub base64: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    /// Short numeric code for phone-number pairing
    #[serde(default)]
    pub pairing_code: Option<String>,
}

impl PairingCode {
    pub fn image(&self) -> Option<&str> {
        self.base64.as_deref().filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    #[serde(default)]
    pub instance_name: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

impl ConnectionState {
    pub fn status(&self) -> InstanceStatus {
        self.state.as_deref().map(InstanceStatus::from_gateway).unwrap_or(InstanceStatus::Unknown)
    }
}

/// Response of `POST /instance/connect/{name}`.
///
/// Carries pairing material when the instance still has to be paired, or the current connection
/// state when it is already open.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectResponse {
    #[serde(flatten)]
    pub pairing: PairingCode,
    #[serde(default)]
    pub instance: Option<ConnectionState>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGatewayInstance {
    pub instance_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    pub qrcode: bool,
    pub integration: String,
}

impl CreateGatewayInstance {
    pub fn new(instance_name: impl Into<String>, number: Option<String>) -> Self {
        Self {
            instance_name: instance_name.into(),
            number,
            qrcode: true,
            integration: "WHATSAPP-BAILEYS".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedInstanceInfo {
    #[serde(default)]
    pub instance_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_opaque_id")]
    pub instance_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Response of `POST /instance/create`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CreatedGatewayInstance {
    #[serde(default)]
    pub instance: CreatedInstanceInfo,
    #[serde(default)]
    pub qrcode: Option<PairingCode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingText {
    pub number: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScheduledText<'a> {
    #[serde(flatten)]
    message: &'a OutgoingText,
    scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageKey {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub remote_jid: Option<String>,
}

/// Response of the send / schedule endpoints.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentMessage {
    #[serde(default)]
    pub key: Option<MessageKey>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message_timestamp: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ConnectionStateEnvelope {
    #[serde(default)]
    instance: ConnectionState,
}

/// Operations offered by the messaging gateway.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// The gateway's authoritative list of instances and their connection status.
    async fn fetch_instances(&self) -> Result<Vec<GatewayInstance>, ClientError>;

    async fn create_instance(&self, request: &CreateGatewayInstance) -> Result<CreatedGatewayInstance, ClientError>;

    /// Start (or resume) pairing for the named instance.
    async fn connect(&self, instance_name: &str) -> Result<ConnectResponse, ClientError>;

    async fn connection_state(&self, instance_name: &str) -> Result<InstanceStatus, ClientError>;

    async fn send_text(&self, instance_name: &str, message: &OutgoingText) -> Result<SentMessage, ClientError>;

    async fn schedule_text(&self, instance_name: &str, message: &OutgoingText, at: DateTime<Utc>) -> Result<SentMessage, ClientError>;
}

/// The concrete implementation of [`Gateway`].
#[derive(Clone)]
pub struct GatewayReqwest {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl GatewayReqwest {
    /// The client is shared so connection pools survive across settings changes.
    pub fn new(client: Client, base_url: Url, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url,
            api_key: api_key.into(),
        }
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        join_url(&self.base_url, path, SERVICE)
    }

    fn instance_url(&self, prefix: &str, instance_name: &str) -> Result<Url, ClientError> {
        let mut url = self.url(prefix)?;
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl {
                service: SERVICE,
                message: format!("'{}' cannot be a base", self.base_url),
            })?
            .pop_if_empty()
            .push(instance_name);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, ClientError> {
        request
            .header("apikey", &self.api_key)
            .send()
            .await
            .map_err(|source| ClientError::Transport { service: SERVICE, source })
    }
}

#[async_trait]
impl Gateway for GatewayReqwest {
    #[instrument(skip(self))]
    async fn fetch_instances(&self) -> Result<Vec<GatewayInstance>, ClientError> {
        let request = self.client.get(self.url("instance/fetchInstances")?);
        let instances: Vec<GatewayInstance> = read_json(self.send(request).await?, SERVICE).await?;
        debug!(count = instances.len(), "Fetched gateway instances");
        Ok(instances)
    }

    #[instrument(skip(self, request), fields(instance = %request.instance_name))]
    async fn create_instance(&self, request: &CreateGatewayInstance) -> Result<CreatedGatewayInstance, ClientError> {
        let http = self.client.post(self.url("instance/create")?).json(request);
        read_json(self.send(http).await?, SERVICE).await
    }

    #[instrument(skip(self))]
    async fn connect(&self, instance_name: &str) -> Result<ConnectResponse, ClientError> {
        let request = self.client.post(self.instance_url("instance/connect/", instance_name)?);
        read_json(self.send(request).await?, SERVICE).await
    }

    #[instrument(skip(self))]
    async fn connection_state(&self, instance_name: &str) -> Result<InstanceStatus, ClientError> {
        let request = self.client.get(self.instance_url("instance/connectionState/", instance_name)?);
        let envelope: ConnectionStateEnvelope = read_json(self.send(request).await?, SERVICE).await?;
        Ok(envelope.instance.status())
    }

    #[instrument(skip(self, message))]
    async fn send_text(&self, instance_name: &str, message: &OutgoingText) -> Result<SentMessage, ClientError> {
        let request = self
            .client
            .post(self.instance_url("message/sendText/", instance_name)?)
            .json(message);
        read_json(self.send(request).await?, SERVICE).await
    }

    #[instrument(skip(self, message))]
    async fn schedule_text(&self, instance_name: &str, message: &OutgoingText, at: DateTime<Utc>) -> Result<SentMessage, ClientError> {
        let body = ScheduledText { message, scheduled_at: at };
        let request = self
            .client
            .post(self.instance_url("message/schedule/", instance_name)?)
            .json(&body);
        read_json(self.send(request).await?, SERVICE).await
    }
}

/// Hands out a [`Gateway`] built from the current settings.
#[async_trait]
pub trait GatewayProvider: Send + Sync {
    async fn gateway(&self) -> Result<Arc<dyn Gateway>, Error>;
}

/// Builds [`GatewayReqwest`] clients from the settings singleton, falling back to the service
/// configuration for fields the settings row leaves empty.
#[derive(Clone)]
pub struct SettingsGatewayProvider {
    settings: SettingsStore,
    client: Client,
    fallback_url: Option<Url>,
    fallback_api_key: Option<String>,
}

impl SettingsGatewayProvider {
    pub fn new(settings: SettingsStore, config: &crate::config::GatewayConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|source| ClientError::Transport { service: SERVICE, source })?;
        Ok(Self {
            settings,
            client,
            fallback_url: config.fallback_url.clone(),
            fallback_api_key: config.fallback_api_key.clone(),
        })
    }
}

#[async_trait]
impl GatewayProvider for SettingsGatewayProvider {
    async fn gateway(&self) -> Result<Arc<dyn Gateway>, Error> {
        let settings = self.settings.get().await;

        let base_url = match settings
            .as_ref()
            .and_then(|s| s.gateway_base_url.as_deref())
            .filter(|s| !s.trim().is_empty())
        {
            Some(raw) => raw
                .trim()
                .parse::<Url>()
                .map_err(|e| Error::not_configured(format!("gateway base URL '{raw}' is invalid: {e}")))?,
            None => self
                .fallback_url
                .clone()
                .ok_or_else(|| Error::not_configured("gateway base URL"))?,
        };

        let api_key = settings
            .as_ref()
            .and_then(|s| s.gateway_api_key.clone())
            .filter(|s| !s.is_empty())
            .or_else(|| self.fallback_api_key.clone())
            .ok_or_else(|| Error::not_configured("gateway API key"))?;

        Ok(Arc::new(GatewayReqwest::new(self.client.clone(), base_url, api_key)))
    }
}
