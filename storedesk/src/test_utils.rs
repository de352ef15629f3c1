//! Test utilities: in-memory backends and a fully wired test app.

use crate::clients::gateway::{
    ConnectResponse, CreateGatewayInstance, CreatedGatewayInstance, Gateway, GatewayInstance, MessageKey, OutgoingText, SentMessage,
};
use crate::clients::{ClientError, GatewayProvider, Row, Service, TableStore};
use crate::config::{Config, TablesConfig};
use crate::errors::Error;
use crate::models::instances::Instance;
use crate::store::SettingsStore;
use crate::types::{InstanceStatus, RowId, TableId};
use crate::{AppState, build_router};
use async_trait::async_trait;
use axum_test::TestServer;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub fn instance(id: &str, name: &str, status: InstanceStatus) -> Instance {
    Instance {
        id: id.to_string(),
        name: name.to_string(),
        phone: None,
        gateway_id: None,
        status,
        created_at: None,
        updated_at: None,
    }
}

fn row_id(row: &Row) -> Option<String> {
    match row.get("id")? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn status_error(service: Service, status: u16) -> ClientError {
    ClientError::Status {
        service,
        status,
        body: "scripted failure".to_string(),
    }
}

/// A [`TableStore`] backed by in-memory tables. Row ids are sequential numbers across all tables.
#[derive(Default)]
pub struct InMemoryTableStore {
    tables: Mutex<HashMap<TableId, Vec<Row>>>,
    next_id: AtomicU64,
    calls: Mutex<HashMap<&'static str, usize>>,
    failing: AtomicBool,
}

impl InMemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert rows as-is, assigning each a fresh id. Returns the ids.
    pub fn seed(&self, table: TableId, rows: Vec<Value>) -> Vec<RowId> {
        let mut tables = self.tables.lock().unwrap();
        let entries = tables.entry(table).or_default();
        rows.into_iter()
            .map(|value| {
                let Value::Object(mut row) = value else {
                    panic!("seeded rows must be JSON objects");
                };
                let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                row.insert("id".into(), Value::from(id));
                entries.push(row);
                id.to_string()
            })
            .collect()
    }

    pub fn rows(&self, table: TableId) -> Vec<Row> {
        self.tables.lock().unwrap().get(&table).cloned().unwrap_or_default()
    }

    /// How many times the named trait method was called.
    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().unwrap().get(method).copied().unwrap_or(0)
    }

    /// Make every call fail with a 503 until switched off again.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn record(&self, method: &'static str) -> Result<(), ClientError> {
        *self.calls.lock().unwrap().entry(method).or_default() += 1;
        if self.failing.load(Ordering::SeqCst) {
            return Err(status_error(Service::TableStore, 503));
        }
        Ok(())
    }
}

#[async_trait]
impl TableStore for InMemoryTableStore {
    async fn list_rows(&self, table: TableId) -> Result<Vec<Row>, ClientError> {
        self.record("list_rows")?;
        Ok(self.rows(table))
    }

    async fn create_row(&self, table: TableId, row: &Row) -> Result<Row, ClientError> {
        self.record("create_row")?;
        let mut row = row.clone();
        row.remove("id");
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        row.insert("id".into(), Value::from(id));
        self.tables.lock().unwrap().entry(table).or_default().push(row.clone());
        Ok(row)
    }

    async fn update_row(&self, table: TableId, id: &RowId, patch: &Row) -> Result<Row, ClientError> {
        self.record("update_row")?;
        let mut tables = self.tables.lock().unwrap();
        let row = tables
            .get_mut(&table)
            .and_then(|rows| rows.iter_mut().find(|r| row_id(r).as_deref() == Some(id.as_str())))
            .ok_or_else(|| status_error(Service::TableStore, 404))?;
        for (key, value) in patch {
            if key != "id" {
                row.insert(key.clone(), value.clone());
            }
        }
        Ok(row.clone())
    }

    async fn delete_row(&self, table: TableId, id: &RowId) -> Result<(), ClientError> {
        self.record("delete_row")?;
        let mut tables = self.tables.lock().unwrap();
        let rows = tables.get_mut(&table).ok_or_else(|| status_error(Service::TableStore, 404))?;
        let position = rows
            .iter()
            .position(|r| row_id(r).as_deref() == Some(id.as_str()))
            .ok_or_else(|| status_error(Service::TableStore, 404))?;
        rows.remove(position);
        Ok(())
    }
}

/// A text the [`ScriptedGateway`] was asked to send or schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct SentText {
    pub instance: String,
    pub message: OutgoingText,
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// A [`Gateway`] whose answers are set up by the test.
#[derive(Default)]
pub struct ScriptedGateway {
    instances: Mutex<Vec<GatewayInstance>>,
    fetch_failure: Mutex<Option<u16>>,
    fetch_calls: AtomicUsize,
    connection_state_calls: AtomicUsize,
    connect_response: Mutex<ConnectResponse>,
    connect_script: Mutex<VecDeque<(Duration, ConnectResponse)>>,
    connect_failure: Mutex<Option<u16>>,
    create_response: Mutex<CreatedGatewayInstance>,
    created: Mutex<Vec<CreateGatewayInstance>>,
    send_failure: Mutex<Option<u16>>,
    sent: Mutex<Vec<SentText>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_instances(&self, instances: Vec<GatewayInstance>) {
        *self.instances.lock().unwrap() = instances;
    }

    /// Fail `fetch_instances` with the given status, or answer normally with `None`.
    pub fn fail_fetch(&self, status: Option<u16>) {
        *self.fetch_failure.lock().unwrap() = status;
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn connection_state_calls(&self) -> usize {
        self.connection_state_calls.load(Ordering::SeqCst)
    }

    /// Answer used by `connect` once the script is exhausted.
    pub fn set_connect_response(&self, response: ConnectResponse) {
        *self.connect_response.lock().unwrap() = response;
    }

    /// Queue a one-off `connect` answer delivered after `delay`.
    pub fn script_connect(&self, delay: Duration, response: ConnectResponse) {
        self.connect_script.lock().unwrap().push_back((delay, response));
    }

    pub fn fail_connect(&self, status: Option<u16>) {
        *self.connect_failure.lock().unwrap() = status;
    }

    pub fn set_create_response(&self, response: CreatedGatewayInstance) {
        *self.create_response.lock().unwrap() = response;
    }

    pub fn created(&self) -> Vec<CreateGatewayInstance> {
        self.created.lock().unwrap().clone()
    }

    pub fn fail_send(&self, status: Option<u16>) {
        *self.send_failure.lock().unwrap() = status;
    }

    pub fn sent(&self) -> Vec<SentText> {
        self.sent.lock().unwrap().clone()
    }

    fn record_send(&self, instance_name: &str, message: &OutgoingText, scheduled_at: Option<DateTime<Utc>>) -> Result<SentMessage, ClientError> {
        if let Some(status) = *self.send_failure.lock().unwrap() {
            return Err(status_error(Service::Gateway, status));
        }
        self.sent.lock().unwrap().push(SentText {
            instance: instance_name.to_string(),
            message: message.clone(),
            scheduled_at,
        });
        Ok(SentMessage {
            key: Some(MessageKey {
                id: Some(format!("MSG{}", self.sent.lock().unwrap().len())),
                remote_jid: None,
            }),
            status: Some(if scheduled_at.is_some() { "SCHEDULED" } else { "PENDING" }.to_string()),
            message_timestamp: None,
        })
    }
}

#[async_trait]
impl Gateway for ScriptedGateway {
    async fn fetch_instances(&self) -> Result<Vec<GatewayInstance>, ClientError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = *self.fetch_failure.lock().unwrap() {
            return Err(status_error(Service::Gateway, status));
        }
        Ok(self.instances.lock().unwrap().clone())
    }

    async fn create_instance(&self, request: &CreateGatewayInstance) -> Result<CreatedGatewayInstance, ClientError> {
        self.created.lock().unwrap().push(request.clone());
        Ok(self.create_response.lock().unwrap().clone())
    }

    async fn connect(&self, _instance_name: &str) -> Result<ConnectResponse, ClientError> {
        if let Some(status) = *self.connect_failure.lock().unwrap() {
            return Err(status_error(Service::Gateway, status));
        }
        let scripted = self.connect_script.lock().unwrap().pop_front();
        match scripted {
            Some((delay, response)) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(response)
            }
            None => Ok(self.connect_response.lock().unwrap().clone()),
        }
    }

    async fn connection_state(&self, instance_name: &str) -> Result<InstanceStatus, ClientError> {
        self.connection_state_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .instances
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.name == instance_name)
            .map(|i| i.status())
            .unwrap_or_default())
    }

    async fn send_text(&self, instance_name: &str, message: &OutgoingText) -> Result<SentMessage, ClientError> {
        self.record_send(instance_name, message, None)
    }

    async fn schedule_text(&self, instance_name: &str, message: &OutgoingText, at: DateTime<Utc>) -> Result<SentMessage, ClientError> {
        self.record_send(instance_name, message, Some(at))
    }
}

/// Always hands out the same gateway, or reports it as not configured.
pub struct StaticGatewayProvider(Option<Arc<dyn Gateway>>);

impl StaticGatewayProvider {
    pub fn shared(gateway: Arc<ScriptedGateway>) -> Arc<dyn GatewayProvider> {
        Arc::new(Self(Some(gateway as Arc<dyn Gateway>)))
    }

    pub fn unconfigured() -> Arc<dyn GatewayProvider> {
        Arc::new(Self(None))
    }
}

#[async_trait]
impl GatewayProvider for StaticGatewayProvider {
    async fn gateway(&self) -> Result<Arc<dyn Gateway>, Error> {
        self.0.clone().ok_or_else(|| Error::not_configured("gateway base URL"))
    }
}

pub const INSTANCES_TABLE: TableId = 1;
pub const SETTINGS_TABLE: TableId = 2;
pub const MESSAGES_TABLE: TableId = 3;
pub const PRODUCTS_TABLE: TableId = 4;

pub fn create_test_config() -> Config {
    let mut config = Config::default();
    config.host = "127.0.0.1".to_string();
    config.port = 0;
    config.table_store.token = "test-token".to_string();
    config.table_store.tables = TablesConfig {
        instances: INSTANCES_TABLE,
        settings: SETTINGS_TABLE,
        messages: MESSAGES_TABLE,
        products: Some(PRODUCTS_TABLE),
        posts: None,
        courses: None,
    };
    config.background_services.pairing.poll_interval = Duration::from_secs(3);
    config
}

/// A router over in-memory backends, with handles to inspect them.
pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub table_store: Arc<InMemoryTableStore>,
    pub gateway: Arc<ScriptedGateway>,
}

pub fn create_test_app() -> TestApp {
    create_test_app_with(Arc::new(InMemoryTableStore::new()), Some(Arc::new(ScriptedGateway::new())))
}

/// Build the app; `gateway: None` makes every gateway call report "not configured".
pub fn create_test_app_with(table_store: Arc<InMemoryTableStore>, gateway: Option<Arc<ScriptedGateway>>) -> TestApp {
    let config = create_test_config();
    let scripted = gateway.clone().unwrap_or_default();
    let gateways = match gateway {
        Some(gateway) => StaticGatewayProvider::shared(gateway),
        None => StaticGatewayProvider::unconfigured(),
    };

    let settings = SettingsStore::new(table_store.clone(), SETTINGS_TABLE);
    let state = AppState::assemble(config, table_store.clone(), settings, gateways, CancellationToken::new());
    let router = build_router(state.clone()).expect("Failed to build router");
    let server = TestServer::new(router).expect("Failed to create test server");
    TestApp {
        server,
        state,
        table_store,
        gateway: scripted,
    }
}
