//! Client for the hosted table-store API.
//!
//! Rows live under `{base}/database/rows/table/{table_id}/` and are flat JSON objects keyed by
//! field name (`user_field_names=true`). Every request carries `Authorization: Token <token>`.

use crate::clients::{ClientError, Service, join_url, read_body, read_json};
use crate::config::TableStoreConfig;
use crate::types::{RowId, TableId};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// A flat row as the table store returns it.
pub type Row = serde_json::Map<String, serde_json::Value>;

const SERVICE: Service = Service::TableStore;

/// Row CRUD against the table store.
///
/// In practise this is [`TableStoreReqwest`]; tests use an in-memory implementation.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// List every row of a table, following pagination until exhausted.
    async fn list_rows(&self, table: TableId) -> Result<Vec<Row>, ClientError>;

    async fn create_row(&self, table: TableId, row: &Row) -> Result<Row, ClientError>;

    /// Partial update: only the fields present in `patch` are changed.
    async fn update_row(&self, table: TableId, id: &RowId, patch: &Row) -> Result<Row, ClientError>;

    async fn delete_row(&self, table: TableId, id: &RowId) -> Result<(), ClientError>;
}

#[derive(Debug, Deserialize)]
struct RowPage {
    #[serde(default)]
    next: Option<String>,
    #[serde(default)]
    results: Vec<Row>,
}

/// The concrete implementation of [`TableStore`].
#[derive(Clone)]
pub struct TableStoreReqwest {
    client: Client,
    base_url: Url,
    token: String,
    page_size: u32,
}

impl TableStoreReqwest {
    pub fn new(config: &TableStoreConfig) -> Result<Self, ClientError> {
        Self::with_parts(config.url.clone(), config.token.clone(), config.page_size, config.request_timeout)
    }

    pub fn with_parts(base_url: Url, token: String, page_size: u32, request_timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|source| ClientError::Transport { service: SERVICE, source })?;
        Ok(Self {
            client,
            base_url,
            token,
            page_size: page_size.max(1),
        })
    }

    fn table_url(&self, table: TableId) -> Result<Url, ClientError> {
        join_url(&self.base_url, &format!("database/rows/table/{table}/"), SERVICE)
    }

    fn row_url(&self, table: TableId, id: &RowId) -> Result<Url, ClientError> {
        if id.is_empty() || id.contains('/') || id == "." || id == ".." {
            return Err(ClientError::InvalidUrl {
                service: SERVICE,
                message: format!("'{id}' is not a usable row id"),
            });
        }
        let mut url = self.table_url(table)?;
        // Pushed as a segment so `?` and `#` are percent-encoded
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl {
                service: SERVICE,
                message: format!("'{}' cannot be a base", self.base_url),
            })?
            .pop_if_empty()
            .push(id)
            .push("");
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("Authorization", format!("Token {}", self.token))
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, ClientError> {
        self.authorized(request)
            .send()
            .await
            .map_err(|source| ClientError::Transport { service: SERVICE, source })
    }
}

#[async_trait]
impl TableStore for TableStoreReqwest {
    #[instrument(skip(self))]
    async fn list_rows(&self, table: TableId) -> Result<Vec<Row>, ClientError> {
        let url = self.table_url(table)?;
        let mut rows = Vec::new();
        let mut page: u32 = 1;

        loop {
            let request = self.client.get(url.clone()).query(&[
                ("user_field_names", "true".to_string()),
                ("page", page.to_string()),
                ("size", self.page_size.to_string()),
            ]);
            let body: RowPage = read_json(self.send(request).await?, SERVICE).await?;
            debug!(table, page, received = body.results.len(), "Fetched table rows");
            rows.extend(body.results);

            if body.next.is_none() {
                break;
            }
            page += 1;
        }

        Ok(rows)
    }

    #[instrument(skip(self, row))]
    async fn create_row(&self, table: TableId, row: &Row) -> Result<Row, ClientError> {
        let request = self.client.post(self.table_url(table)?).query(&[("user_field_names", "true")]).json(row);
        read_json(self.send(request).await?, SERVICE).await
    }

    #[instrument(skip(self, patch))]
    async fn update_row(&self, table: TableId, id: &RowId, patch: &Row) -> Result<Row, ClientError> {
        let request = self
            .client
            .patch(self.row_url(table, id)?)
            .query(&[("user_field_names", "true")])
            .json(patch);
        read_json(self.send(request).await?, SERVICE).await
    }

    #[instrument(skip(self))]
    async fn delete_row(&self, table: TableId, id: &RowId) -> Result<(), ClientError> {
        let request = self.client.delete(self.row_url(table, id)?);
        read_body(self.send(request).await?, SERVICE).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, page_size: u32) -> TableStoreReqwest {
        let base: Url = format!("{}/api", server.uri()).parse().unwrap();
        TableStoreReqwest::with_parts(base, "secret".to_string(), page_size, Duration::from_secs(5)).unwrap()
    }

    fn as_row(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_list_rows_follows_pagination() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/database/rows/table/7/"))
            .and(query_param("page", "1"))
            .and(query_param("size", "2"))
            .and(query_param("user_field_names", "true"))
            .and(header("Authorization", "Token secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "count": 3,
                "next": "http://ignored/?page=2",
                "previous": null,
                "results": [{"id": 1, "name": "a"}, {"id": 2, "name": "b"}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/database/rows/table/7/"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "count": 3,
                "next": null,
                "previous": "http://ignored/?page=1",
                "results": [{"id": 3, "name": "c"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let rows = client_for(&server, 2).list_rows(7).await.unwrap();
        let names: Vec<_> = rows.iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_create_and_update_rows() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/database/rows/table/4/"))
            .and(body_json(json!({"name": "main"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 10, "name": "main"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/api/database/rows/table/4/10/"))
            .and(body_json(json!({"name": "renamed"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 10, "name": "renamed"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, 100);
        let created = client.create_row(4, &as_row(json!({"name": "main"}))).await.unwrap();
        assert_eq!(created["id"], json!(10));

        let updated = client
            .update_row(4, &"10".to_string(), &as_row(json!({"name": "renamed"})))
            .await
            .unwrap();
        assert_eq!(updated["name"], json!("renamed"));
    }

    #[tokio::test]
    async fn test_delete_row_and_status_errors() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/database/rows/table/4/10/"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/database/rows/table/4/11/"))
            .respond_with(ResponseTemplate::new(404).set_body_string("ERROR_ROW_DOES_NOT_EXIST"))
            .mount(&server)
            .await;

        let client = client_for(&server, 100);
        client.delete_row(4, &"10".to_string()).await.unwrap();

        let err = client.delete_row(4, &"11".to_string()).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(matches!(err, ClientError::Status { status: 404, ref body, .. } if body == "ERROR_ROW_DOES_NOT_EXIST"));
    }

    #[tokio::test]
    async fn test_rejects_unusable_row_ids() {
        let server = MockServer::start().await;
        let client = client_for(&server, 100);
        for id in ["../5", "", "..", "."] {
            let err = client.delete_row(4, &id.to_string()).await.unwrap_err();
            assert!(matches!(err, ClientError::InvalidUrl { .. }), "{id:?}");
        }
    }

    #[tokio::test]
    async fn test_row_id_is_escaped_in_path() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/database/rows/table/4/7%3Fx%23y/"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/database/rows/table/4/7"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        client_for(&server, 100).delete_row(4, &"7?x#y".to_string()).await.unwrap();
    }

    #[tokio::test]
    async fn test_transport_error() {
        let base: Url = "http://127.0.0.1:1/api".parse().unwrap();
        let client = TableStoreReqwest::with_parts(base, "t".into(), 10, Duration::from_secs(2)).unwrap();
        let err = client.list_rows(1).await.unwrap_err();
        assert!(matches!(err, ClientError::Transport { service: Service::TableStore, .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_decode_error_on_unexpected_shape() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = client_for(&server, 10).list_rows(1).await.unwrap_err();
        assert!(matches!(err, ClientError::Decode { .. }));
    }
}
