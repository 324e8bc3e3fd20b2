//! Server initialization and routing

use crate::admission::{AdmissionController, LimiterPolicy};
use crate::api;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::domain::names;
use crate::jwt::JwtManager;
use crate::middleware::{
    admission::{IP_LIMITED, USER_LIMITED, USER_LIMITED_CONCURRENT},
    admission_middleware, authenticate, require_policy, AdmissionState, ObservabilityLayer,
    RequiredPolicy,
};
use crate::policy::PolicyProvider;
use crate::repository::{InMemoryUserStore, UserStore};
use crate::state::HasAccessControl;
use anyhow::Result;
use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post, MethodRouter},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub jwt_manager: JwtManager,
    pub policy_provider: PolicyProvider,
    pub admission: Arc<AdmissionController>,
    pub clock: Arc<dyn Clock>,
    pub user_store: Arc<dyn UserStore>,
}

impl AppState {
    /// Wire the access-control components from configuration.
    pub fn new(config: Config, user_store: Arc<dyn UserStore>) -> Self {
        let jwt_manager = JwtManager::new(config.jwt.clone());
        let admission = Arc::new(AdmissionController::new(&config.rate_limit));
        Self {
            config: Arc::new(config),
            jwt_manager,
            policy_provider: PolicyProvider::default(),
            admission,
            clock: Arc::new(SystemClock),
            user_store,
        }
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl HasAccessControl for AppState {
    fn config(&self) -> &Config {
        &self.config
    }

    fn jwt_manager(&self) -> &JwtManager {
        &self.jwt_manager
    }

    fn policy_provider(&self) -> &PolicyProvider {
        &self.policy_provider
    }

    fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    fn user_store(&self) -> &dyn UserStore {
        self.user_store.as_ref()
    }
}

/// Attach admission limits to a route.
///
/// User partitions key on the credential subject, so user-limited routes
/// reject anonymous callers with 401 before admission runs.
fn limited<S: HasAccessControl>(
    state: &S,
    route: MethodRouter<S>,
    limits: &'static [LimiterPolicy],
) -> MethodRouter<S> {
    let route = route.route_layer(from_fn_with_state(
        AdmissionState::new(state.clone(), limits),
        admission_middleware::<S>,
    ));
    if !limits.contains(&LimiterPolicy::User) {
        return route;
    }
    route.route_layer(from_fn_with_state(
        RequiredPolicy::default_policy(state.policy_provider().clone()),
        require_policy,
    ))
}

/// Attach a named policy and admission limits to a route.
///
/// Admission runs first so throttled callers never reach policy evaluation.
fn guarded<S: HasAccessControl>(
    state: &S,
    route: MethodRouter<S>,
    policy: &'static str,
    limits: &'static [LimiterPolicy],
) -> MethodRouter<S> {
    let route = route.route_layer(from_fn_with_state(
        RequiredPolicy::new(state.policy_provider().clone(), policy),
        require_policy,
    ));
    limited(state, route, limits)
}

/// Build the HTTP router
///
/// Pass the Prometheus handle returned by telemetry init to expose `/metrics`.
pub fn build_router<S: HasAccessControl>(state: S, prometheus: Option<PrometheusHandle>) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let router = Router::new()
        // Health endpoint
        .route("/health", get(api::health::health))
        // Auth endpoints
        .route(
            "/api/v1/auth/token",
            limited(&state, post(api::auth::token::<S>), IP_LIMITED),
        )
        .route(
            "/api/v1/me/permissions",
            limited(&state, get(api::auth::my_permissions), USER_LIMITED),
        )
        // Poll endpoints
        .route(
            "/api/v1/polls",
            guarded(
                &state,
                get(api::polls::list_polls),
                names::POLLS_READ,
                USER_LIMITED_CONCURRENT,
            ),
        )
        .route(
            "/api/v1/polls",
            guarded(
                &state,
                post(api::polls::create_poll),
                names::POLLS_CREATE,
                USER_LIMITED_CONCURRENT,
            ),
        )
        .route(
            "/api/v1/polls/{id}",
            guarded(
                &state,
                delete(api::polls::delete_poll),
                names::POLLS_DELETE,
                USER_LIMITED_CONCURRENT,
            ),
        )
        .layer(from_fn_with_state(state.clone(), authenticate::<S>))
        // Inside TraceLayer so `authenticate` records the subject on this span
        .layer(ObservabilityLayer)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    match prometheus {
        Some(handle) => router.merge(
            Router::new()
                .route("/metrics", get(api::metrics::metrics_handler))
                .with_state(Arc::new(Some(handle))),
        ),
        None => router,
    }
}

/// Build the user store, seeding the bootstrap administrator if configured
fn build_user_store(config: &Config) -> Result<InMemoryUserStore> {
    let store = InMemoryUserStore::new();
    let Some(admin) = &config.bootstrap_admin else {
        tracing::warn!("No bootstrap administrator configured");
        return Ok(store);
    };

    let store = store.with_user(&admin.email, &admin.password, names::ALL.iter().copied())?;
    info!(email = %admin.email, "Seeded bootstrap administrator");
    Ok(store)
}

/// Run the server
pub async fn run(config: Config, prometheus: Option<PrometheusHandle>) -> Result<()> {
    config.validate()?;

    let user_store = Arc::new(build_user_store(&config)?);
    let http_addr = config.http_addr();
    let state = AppState::new(config, user_store);

    info!(
        enabled = state.admission.is_enabled(),
        permit_limit = state.admission.gate().permit_limit(),
        queue_limit = state.admission.gate().queue_limit(),
        "Admission control configured"
    );

    let app = build_router(state, prometheus);

    let listener = TcpListener::bind(&http_addr).await?;
    info!("HTTP server started on {}", http_addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
