use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router,
    routing::{get, patch, post},
};
use rescue_assignment::{AssignmentEngine, CaseLifecycle};
use rescue_db_memory::InMemoryStore;
use rescue_notifications::{ChannelTransport, NotificationDispatcher};
use rescue_storage::{DynCapacityStore, DynCaseStore, DynVerificationCodeStore};
use thiserror::Error;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::{
    config::AppConfig,
    geocoding::{Geocoder, GeocodingError, LocationIqGeocoder},
    handlers, seed, websocket,
};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("geocoder initialization failed: {0}")]
    Geocoder(#[from] GeocodingError),
    #[error("seeding failed: {0}")]
    Seed(#[from] seed::SeedError),
}

/// Everything a request handler can reach.
#[derive(Clone)]
pub struct AppState {
    pub capacity: DynCapacityStore,
    pub cases: DynCaseStore,
    pub codes: DynVerificationCodeStore,
    pub lifecycle: Arc<CaseLifecycle>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub transport: Arc<ChannelTransport>,
    pub geocoder: Option<Arc<dyn Geocoder>>,
}

impl AppState {
    /// Wires the engine, lifecycle and dispatcher around one in-memory
    /// store. The dispatcher is not started.
    pub fn with_store(store: Arc<InMemoryStore>, cfg: &AppConfig) -> Self {
        let capacity: DynCapacityStore = store.clone();
        let cases: DynCaseStore = store.clone();
        let codes: DynVerificationCodeStore = store;

        let transport = Arc::new(ChannelTransport::new(cfg.notifications.session_buffer));
        let dispatcher = Arc::new(NotificationDispatcher::new(
            cfg.dispatcher_config(),
            transport.clone(),
        ));
        let engine = Arc::new(AssignmentEngine::new(
            capacity.clone(),
            Some(dispatcher.clone()),
            cfg.assignment_config(),
        ));
        let lifecycle = Arc::new(CaseLifecycle::new(cases.clone(), capacity.clone(), engine));

        Self {
            capacity,
            cases,
            codes,
            lifecycle,
            dispatcher,
            transport,
            geocoder: None,
        }
    }

    pub fn with_geocoder(mut self, geocoder: Arc<dyn Geocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }
}

pub struct RescueServer {
    addr: SocketAddr,
    app: Router,
    state: AppState,
}

pub fn build_app(state: AppState, cfg: &AppConfig) -> Router {
    let body_limit = cfg.server.body_limit_bytes;
    Router::new()
        .route("/healthz", get(handlers::healthz))
        // Cases
        .route("/cases", get(handlers::list_cases).post(handlers::submit_case))
        .route("/cases/retry", post(handlers::retry_pending))
        .route("/cases/{id}", get(handlers::get_case))
        .route("/cases/{id}/assign", post(handlers::assign_case))
        .route("/cases/{id}/status", patch(handlers::update_case_status))
        // Resources
        .route("/hospitals", get(handlers::list_hospitals))
        .route("/hospitals/{id}", get(handlers::get_hospital))
        .route("/hospitals/{id}/capacity", patch(handlers::update_capacity))
        .route("/responders", get(handlers::list_responders))
        .route("/responders/{id}/status", patch(handlers::update_responder_status))
        // Staff registration
        .route(
            "/verification-codes",
            get(handlers::list_codes).post(handlers::create_code),
        )
        .route("/verification-codes/consume", post(handlers::consume_code))
        // Live updates
        .route("/ws/{user_id}", get(websocket::ws_handler))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(|req: &axum::http::Request<_>| {
                            use tracing::field::Empty;
                            tracing::info_span!(
                                "http.request",
                                http.method = %req.method(),
                                http.target = %req.uri(),
                                http.status_code = Empty,
                            )
                        })
                        .on_response(
                            |res: &axum::http::Response<_>,
                             latency: Duration,
                             span: &tracing::Span| {
                                span.record(
                                    "http.status_code",
                                    tracing::field::display(res.status().as_u16()),
                                );
                                tracing::info!(
                                    http.status = %res.status().as_u16(),
                                    elapsed_ms = %latency.as_millis(),
                                    "request handled"
                                );
                            },
                        ),
                )
                .layer(axum::extract::DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
    store: Option<Arc<InMemoryStore>>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
            store: None,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    pub fn with_store(mut self, store: Arc<InMemoryStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Seeds the store, builds the geocoder and starts the dispatcher.
    pub async fn build(self) -> Result<RescueServer, ServerError> {
        let store = self.store.unwrap_or_else(|| Arc::new(InMemoryStore::new()));
        if let Some(path) = &self.config.seed.path {
            let data = seed::load(path)?;
            seed::apply(data, store.as_ref(), store.as_ref()).await?;
        }

        let mut state = AppState::with_store(store, &self.config);
        if let Some(geocoder) = LocationIqGeocoder::from_config(&self.config.geocoding)? {
            tracing::info!(base_url = %self.config.geocoding.base_url, "Geocoding enabled");
            state = state.with_geocoder(Arc::new(geocoder));
        }
        state.dispatcher.start();

        let app = build_app(state.clone(), &self.config);
        Ok(RescueServer {
            addr: self.addr,
            app,
            state,
        })
    }
}

impl RescueServer {
    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        self.state.dispatcher.stop().await;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
