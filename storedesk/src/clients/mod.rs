//! HTTP clients for the two external backends.
//!
//! - [`table_store`]: row CRUD against the hosted tabular-data API
//! - [`gateway`]: instance lifecycle, pairing and message dispatch against the messaging gateway
//!
//! Both clients sit behind async traits ([`TableStore`], [`Gateway`]) so the stores, polls and
//! handlers can be exercised against in-memory fakes. Both report failures as a single
//! [`ClientError`] taxonomy.

pub mod errors;
pub mod gateway;
pub mod table_store;

pub use errors::{ClientError, Service};
pub use gateway::{Gateway, GatewayProvider, GatewayReqwest, SettingsGatewayProvider};
pub use table_store::{Row, TableStore, TableStoreReqwest};

use url::Url;

/// Makes sure a url has a trailing slash.
///
/// `Url::join` replaces the last path segment unless the base ends in '/': joining '/api' and
/// 'instance' gives '/instance', but '/api/' and 'instance' gives '/api/instance'.
pub(crate) fn ensure_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        url.clone()
    } else {
        let mut new_url = url.clone();
        let mut path = new_url.path().to_string();
        path.push('/');
        new_url.set_path(&path);
        new_url
    }
}

pub(crate) fn join_url(base: &Url, path: &str, service: Service) -> Result<Url, ClientError> {
    ensure_slash(base).join(path).map_err(|e| ClientError::InvalidUrl {
        service,
        message: format!("cannot join '{path}' onto '{base}': {e}"),
    })
}

/// Turn a response into its body text, mapping non-success statuses to [`ClientError::Status`].
pub(crate) async fn read_body(response: reqwest::Response, service: Service) -> Result<String, ClientError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ClientError::Status {
            service,
            status: status.as_u16(),
            body,
        });
    }
    response.text().await.map_err(|source| ClientError::Transport { service, source })
}

/// Read and decode a JSON response body.
pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(response: reqwest::Response, service: Service) -> Result<T, ClientError> {
    let body = read_body(response, service).await?;
    serde_json::from_str(&body).map_err(|e| {
        tracing::debug!(%service, body = %body, "Response body did not match the expected shape");
        ClientError::decode(service, e)
    })
}
