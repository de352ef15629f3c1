//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `STOREDESK_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `STOREDESK_` override YAML values
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `STOREDESK_TABLE_STORE__TOKEN=...` sets the `table_store.token` field.
//!
//! ## Configuration Structure
//!
//! - **Server**: `host`, `port`, `cors_origins`
//! - **Table store**: `table_store.url`, `table_store.token`, `table_store.tables.*` - where rows live
//! - **Gateway**: `gateway.request_timeout`, optional `gateway.fallback_url` / `gateway.fallback_api_key`
//!   used when the settings row does not carry gateway credentials
//! - **Background services**: `background_services.status_reconciler`, `background_services.pairing`
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! STOREDESK_PORT=8080
//! STOREDESK_TABLE_STORE__TOKEN="db-token"
//! STOREDESK_BACKGROUND_SERVICES__STATUS_RECONCILER__INTERVAL=30s
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use url::Url;

use crate::errors::Error;
use crate::types::TableId;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "STOREDESK_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Origins allowed to call the API from a browser. Empty disables CORS headers.
    pub cors_origins: Vec<String>,
    /// Hosted table store holding every row this service reads or writes
    pub table_store: TableStoreConfig,
    /// Messaging gateway client settings
    pub gateway: GatewayConfig,
    /// Background polls
    pub background_services: BackgroundServicesConfig,
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct TableStoreConfig {
    /// API base, e.g. `https://api.baserow.io/api/`
    pub url: Url,
    /// Database token sent as `Authorization: Token <token>`
    pub token: String,
    /// Rows requested per page when listing
    pub page_size: u32,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub tables: TablesConfig,
}

/// Table ids. The first three are required; content tables are optional and their endpoints
/// report "not configured" when unset.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TablesConfig {
    pub instances: TableId,
    pub settings: TableId,
    pub messages: TableId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub products: Option<TableId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub posts: Option<TableId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub courses: Option<TableId>,
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Used when the settings row has no gateway base URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_url: Option<Url>,
    /// Used when the settings row has no gateway API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_api_key: Option<String>,
}

impl fmt::Debug for TableStoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableStoreConfig")
            .field("url", &self.url.as_str())
            .field("token", &"<redacted>")
            .field("page_size", &self.page_size)
            .field("request_timeout", &self.request_timeout)
            .field("tables", &self.tables)
            .finish()
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("request_timeout", &self.request_timeout)
            .field("fallback_url", &self.fallback_url.as_ref().map(Url::as_str))
            .field("fallback_api_key", &self.fallback_api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackgroundServicesConfig {
    pub status_reconciler: StatusReconcilerConfig,
    pub pairing: PairingConfig,
}

/// Periodic refresh of instance status from the gateway
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StatusReconcilerConfig {
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

/// Poll used while waiting for a pairing image to be scanned
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PairingConfig {
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            cors_origins: Vec::new(),
            table_store: TableStoreConfig::default(),
            gateway: GatewayConfig::default(),
            background_services: BackgroundServicesConfig::default(),
        }
    }
}

impl Default for TableStoreConfig {
    fn default() -> Self {
        Self {
            url: Url::parse("https://api.baserow.io/api/").expect("static URL is valid"),
            token: String::new(),
            page_size: 200,
            request_timeout: Duration::from_secs(30),
            tables: TablesConfig::default(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            fallback_url: None,
            fallback_api_key: None,
        }
    }
}

impl Default for StatusReconcilerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(10),
        }
    }
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            .merge(Yaml::file(&args.config))
            // STOREDESK_CONFIG names the file itself and is not a config key
            .merge(Env::prefixed("STOREDESK_").ignore(&["config"]).split("__"))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.table_store.token.trim().is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: table_store.token is not configured. \
                     Please set STOREDESK_TABLE_STORE__TOKEN or add table_store.token to the config file."
                    .to_string(),
            });
        }

        let tables = &self.table_store.tables;
        for (name, id) in [
            ("instances", tables.instances),
            ("settings", tables.settings),
            ("messages", tables.messages),
        ] {
            if id == 0 {
                return Err(Error::Internal {
                    operation: format!("Config validation: table_store.tables.{name} must be set to a table id"),
                });
            }
        }

        if self.table_store.page_size == 0 {
            return Err(Error::Internal {
                operation: "Config validation: table_store.page_size must be at least 1".to_string(),
            });
        }

        if self.background_services.status_reconciler.interval.is_zero() {
            return Err(Error::Internal {
                operation: "Config validation: background_services.status_reconciler.interval must be greater than zero".to_string(),
            });
        }

        if self.background_services.pairing.poll_interval.is_zero() {
            return Err(Error::Internal {
                operation: "Config validation: background_services.pairing.poll_interval must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}
