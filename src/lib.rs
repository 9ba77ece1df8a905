pub mod config;
pub mod error;
pub mod state;
pub mod auth;
pub mod db;
pub mod models;
pub mod middleware;
pub mod routes;
pub mod store;
pub mod runtime;
pub mod entitlements;
pub mod provision;
pub mod upload;
pub mod filebrowser;
pub mod sweeper;
pub mod rate_limit;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, HeaderValue};
use axum::Router;
use sqlx::PgPool;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::entitlements::{Entitlements, QuotaController, TenantLocks};
use crate::filebrowser::FileBrowser;
use crate::provision::Provisioner;
use crate::rate_limit::{ActionRateLimiter, LoginRateLimiter};
use crate::runtime::{Supervisor, SupervisorOptions};
use crate::state::{AppState, SharedState};
use crate::store::{PgStore, ProjectStore};

pub fn build_app(pool: PgPool, config: Config) -> (Router, SharedState) {
    let store: Arc<dyn ProjectStore> = Arc::new(PgStore::new(pool.clone()));
    let supervisor = Arc::new(Supervisor::new(
        store.clone(),
        SupervisorOptions::from_config(&config),
    ));

    let tenant_locks = Arc::new(TenantLocks::default());
    let entitlements = Arc::new(Entitlements::new(
        store.clone(),
        supervisor.clone(),
        config.tiers.clone(),
        tenant_locks.clone(),
    ));
    let quota = Arc::new(QuotaController::new(
        store.clone(),
        supervisor.clone(),
        config.tiers.clone(),
        tenant_locks,
    ));

    let filebrowser = config
        .filebrowser
        .clone()
        .and_then(|fb| match FileBrowser::new(fb) {
            Ok(client) => {
                tracing::info!("File browser integration configured");
                Some(Arc::new(client))
            }
            Err(e) => {
                tracing::warn!("File browser not available: {e}");
                None
            }
        });

    let provisioner = Provisioner::new(
        store.clone(),
        supervisor.clone(),
        quota.clone(),
        filebrowser.clone(),
        config.projects_dir.clone(),
    );

    let max_upload = config.max_upload_size;
    let state: SharedState = Arc::new(AppState {
        pool,
        config,
        store,
        supervisor,
        entitlements,
        quota,
        provisioner,
        filebrowser,
        login_limiter: LoginRateLimiter::new(),
        action_limiter: ActionRateLimiter::default(),
    });

    let app = Router::new()
        .merge(routes::api_routes())
        .route("/health", axum::routing::get(health))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload))
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-frame-options"),
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("referrer-policy"),
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        .with_state(state.clone());

    (app, state)
}

async fn health() -> &'static str {
    "ok"
}
