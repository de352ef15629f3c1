//! # storedesk: storefront back-office service
//!
//! `storedesk` sits between a storefront's admin front end and two hosted backends:
//!
//! - a **table store** (Baserow-style REST API) holding instances, settings, message history and
//!   the storefront/CMS content tables
//! - a **messaging gateway** (Evolution-style REST API) that owns messaging instances, pairing and
//!   message dispatch
//!
//! ## Architecture
//!
//! ### Request Flow
//!
//! Requests arrive at the back-office API under `/admin/api/v1` and are handled by the
//! [`api::handlers`]. Handlers read and mutate local state only through the stores in [`store`],
//! and talk to the backends through the client traits in [`clients`].
//!
//! ### Background Services
//!
//! - **Status reconciler** ([`sync::reconciler`]): every few seconds, fetches the gateway's
//!   instance list and overwrites each local instance's status with what the gateway reports
//! - **Pairing polls** ([`sync::pairing`]): while a pairing image waits to be scanned, watches the
//!   gateway until the instance reports connected
//!
//! Both run on [`sync::poll`] loops driven by child tokens of one shutdown token, so stopping the
//! [`Application`] stops every poll.
//!
//! ## Configuration
//!
//! Configuration is loaded from a YAML file with environment variable overrides (see [`config`]).
//!
//! ## Getting Started
//!
//! ```no_run
//! use storedesk::{Application, Config};
//! use clap::Parser;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = storedesk::config::Args::parse();
//!     let config = Config::load(&args)?;
//!     storedesk::telemetry::init_telemetry()?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async { tokio::signal::ctrl_c().await.ok(); }).await
//! }
//! ```

pub mod api;
pub mod clients;
pub mod config;
pub mod errors;
pub mod models;
pub mod store;
pub mod sync;
pub mod telemetry;
#[cfg(test)]
mod test_utils;
pub mod types;

use crate::api::handlers::{content, instances, messages, settings};
use crate::clients::{GatewayProvider, SettingsGatewayProvider, TableStore, TableStoreReqwest};
use crate::store::{InstanceStore, SettingsStore};
use crate::sync::pairing::PairingManager;
use crate::sync::poll::PollHandle;
use crate::sync::reconciler::StatusReconciler;
use axum::{
    Router,
    http::HeaderValue,
    routing::{delete, get, patch, post},
};
use bon::Builder;
pub use config::Config;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, warn};

/// Application state shared across all request handlers.
///
/// Every field is a cheap handle; clones share the same stores.
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .table_store(table_store)
///     .instances(instances)
///     .settings(settings)
///     .gateways(gateways)
///     .pairing(pairing)
///     .reconciler(reconciler)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub table_store: Arc<dyn TableStore>,
    pub instances: InstanceStore,
    pub settings: SettingsStore,
    pub gateways: Arc<dyn GatewayProvider>,
    pub pairing: PairingManager,
    pub reconciler: StatusReconciler,
}

impl AppState {
    /// Wire the stores and polls around the given backends. Pairing polls run on children of
    /// `shutdown`.
    pub fn assemble(
        config: Config,
        table_store: Arc<dyn TableStore>,
        settings: SettingsStore,
        gateways: Arc<dyn GatewayProvider>,
        shutdown: CancellationToken,
    ) -> Self {
        let instances = InstanceStore::new();
        let pairing = PairingManager::new(
            instances.clone(),
            gateways.clone(),
            config.background_services.pairing.poll_interval,
            shutdown,
        );
        let reconciler = StatusReconciler::new(instances.clone(), gateways.clone());

        AppState::builder()
            .config(config)
            .table_store(table_store)
            .instances(instances)
            .settings(settings)
            .gateways(gateways)
            .pairing(pairing)
            .reconciler(reconciler)
            .build()
    }
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if config.cors_origins.iter().any(|o| o == "*") {
        return Ok(cors.allow_origin(Any));
    }

    let mut origins = Vec::new();
    for origin in &config.cors_origins {
        origins.push(origin.parse::<HeaderValue>()?);
    }
    Ok(cors.allow_origin(origins))
}

/// Build the application router with all endpoints and middleware.
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let api_routes = Router::new()
        .route("/instances", get(instances::list_instances).post(instances::create_instance))
        .route("/instances/reload", post(instances::reload_instances))
        .route("/instances/reconcile", post(instances::reconcile_instances))
        .route("/instances/{id}", delete(instances::delete_instance))
        .route("/instances/{id}/connect", post(instances::connect_instance))
        .route(
            "/instances/{id}/pairing",
            get(instances::get_pairing).delete(instances::cancel_pairing),
        )
        .route("/settings", get(settings::get_settings).put(settings::update_settings))
        .route("/messages", get(messages::list_messages).post(messages::send_message))
        .route("/content/{kind}", get(content::list_content).post(content::create_content))
        .route(
            "/content/{kind}/{id}",
            patch(content::update_content).delete(content::delete_content),
        );

    let cors_layer = create_cors_layer(&state.config)?;

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .nest("/admin/api/v1", api_routes)
        .with_state(state)
        .layer(cors_layer)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    Ok(router)
}

/// Container for background services and their lifecycle management.
///
/// When dropped, the `drop_guard` cancels the shutdown token, which stops the reconciler and
/// every pairing poll.
pub struct BackgroundServices {
    reconciler: Option<PollHandle>,
    shutdown_token: CancellationToken,
    // Pub so that we can disarm it if we want to
    pub drop_guard: Option<tokio_util::sync::DropGuard>,
}

impl BackgroundServices {
    /// Gracefully shutdown all background tasks
    pub async fn shutdown(self) {
        self.shutdown_token.cancel();
        if let Some(reconciler) = self.reconciler {
            reconciler.join().await;
        }
    }
}

fn setup_background_services(state: &AppState, config: &Config, shutdown_token: CancellationToken) -> BackgroundServices {
    let drop_guard = shutdown_token.clone().drop_guard();
    let reconciler_config = &config.background_services.status_reconciler;

    let reconciler = if reconciler_config.enabled {
        Some(state.reconciler.spawn(reconciler_config.interval, shutdown_token.child_token()))
    } else {
        info!("Status reconciler disabled");
        None
    };

    BackgroundServices {
        reconciler,
        shutdown_token,
        drop_guard: Some(drop_guard),
    }
}

/// Main application struct that owns all resources and background services.
///
/// # Lifecycle
///
/// 1. **Create**: [`Application::new`] builds the backend clients, loads the settings and
///    instances from the table store and starts the background services
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and starts handling requests
/// 3. **Shutdown**: When the shutdown signal is received, gracefully stops all services
pub struct Application {
    router: Router,
    config: Config,
    bg_services: BackgroundServices,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting storedesk with configuration: {:#?}", config);

        let tables = config.table_store.tables.clone();
        let table_store: Arc<dyn TableStore> = Arc::new(TableStoreReqwest::new(&config.table_store)?);
        let settings = SettingsStore::new(table_store.clone(), tables.settings);
        let gateways: Arc<dyn GatewayProvider> = Arc::new(SettingsGatewayProvider::new(settings.clone(), &config.gateway)?);

        // Create a shutdown token for coordinating graceful shutdown of background tasks
        let shutdown_token = CancellationToken::new();
        let state = AppState::assemble(config.clone(), table_store, settings, gateways, shutdown_token.clone());

        // A backend hiccup at startup should not keep the API down; the reload endpoint and the
        // first settings save both retry
        if let Err(e) = state.settings.load().await {
            warn!("Failed to load settings, starting without them: {:#}", e);
        }
        if let Err(e) = state.instances.load(state.table_store.as_ref(), tables.instances).await {
            warn!("Failed to load instances, starting with an empty list: {:#}", e);
        }

        let bg_services = setup_background_services(&state, &config, shutdown_token);
        let router = build_router(state)?;

        Ok(Self {
            router,
            config,
            bg_services,
        })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> (axum_test::TestServer, BackgroundServices) {
        let server = axum_test::TestServer::new(self.router).expect("Failed to create test server");
        (server, self.bg_services)
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "storedesk listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        // Run the server with graceful shutdown
        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        // Shutdown background services and wait for tasks to complete
        info!("Stopping background services...");
        self.bg_services.shutdown().await;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utils::{InMemoryTableStore, ScriptedGateway, StaticGatewayProvider, create_test_app, create_test_config};
    use axum::http::header;
    use serde_json::{Value, json};
    use wiremock::matchers::{header as header_matcher, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_healthz() {
        let app = create_test_app();
        let response = app.server.get("/healthz").await;
        response.assert_status_ok();
        response.assert_text("OK");
    }

    #[tokio::test]
    async fn test_cors_allows_configured_origin() {
        let mut config = create_test_config();
        config.cors_origins = vec!["https://shop.example.com".to_string()];
        let table_store = Arc::new(InMemoryTableStore::new());
        let settings = SettingsStore::new(table_store.clone(), config.table_store.tables.settings);
        let state = AppState::assemble(
            config,
            table_store,
            settings,
            StaticGatewayProvider::shared(Arc::new(ScriptedGateway::new())),
            CancellationToken::new(),
        );
        let server = axum_test::TestServer::new(build_router(state).unwrap()).unwrap();

        let response = server
            .get("/admin/api/v1/instances")
            .add_header(header::ORIGIN, HeaderValue::from_static("https://shop.example.com"))
            .await;
        assert_eq!(
            response.header(header::ACCESS_CONTROL_ALLOW_ORIGIN),
            HeaderValue::from_static("https://shop.example.com")
        );

        let response = server
            .get("/admin/api/v1/instances")
            .add_header(header::ORIGIN, HeaderValue::from_static("https://evil.example.com"))
            .await;
        assert!(response.maybe_header(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }

    /// Integration test: build the whole application against a mocked table store and check that
    /// startup loads the instances and the settings, then shut the background services down.
    #[test_log::test(tokio::test)]
    async fn test_application_loads_state_on_startup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/database/rows/table/1/"))
            .and(header_matcher("Authorization", "Token test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "count": 1,
                "next": null,
                "results": [{"id": 11, "name": "shop", "status": "open"}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/database/rows/table/2/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "count": 1,
                "next": null,
                "results": [{"id": 3, "gateway_base_url": "https://gw.example.com", "gateway_api_key": "B6D711FCDE4D4FD5936544120E713976"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = create_test_config();
        config.table_store.url = format!("{}/api/", server.uri()).parse().unwrap();
        config.background_services.status_reconciler.enabled = false;

        let (test_server, bg_services) = Application::new(config).await.unwrap().into_test_server();

        let instances: Value = test_server.get("/admin/api/v1/instances").await.json();
        assert_eq!(instances[0]["id"], "11");
        assert_eq!(instances[0]["status"], "connected");

        let settings: Value = test_server.get("/admin/api/v1/settings").await.json();
        assert_eq!(settings["id"], "3");
        assert_eq!(settings["gateway_api_key"], "********3976");

        bg_services.shutdown().await;
    }

    #[tokio::test]
    async fn test_application_starts_when_table_store_is_down() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let mut config = create_test_config();
        config.table_store.url = server.uri().parse().unwrap();

        let (test_server, bg_services) = Application::new(config).await.unwrap().into_test_server();
        let instances: Value = test_server.get("/admin/api/v1/instances").await.json();
        assert_eq!(instances, json!([]));

        let response = test_server.post("/admin/api/v1/instances/reload").await;
        response.assert_status(axum::http::StatusCode::BAD_GATEWAY);

        bg_services.shutdown().await;
    }
}
