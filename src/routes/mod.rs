pub mod auth;
pub mod tenant;
pub mod projects;
pub mod deployment;
pub mod files;
pub mod admin;
pub mod billing;

use axum::routing::{get, post, put};
use axum::Router;

use crate::state::SharedState;

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        // Auth
        .route("/api/v1/auth/register", post(auth::register))
        .route("/api/v1/auth/login", post(auth::login))
        // Tenant
        .route("/api/v1/tenant", get(tenant::get_tenant))
        // Projects
        .route("/api/v1/projects", get(projects::list).post(projects::create))
        .route(
            "/api/v1/projects/{id}",
            get(projects::get).delete(projects::delete),
        )
        .route("/api/v1/projects/{id}/command", put(projects::update_command))
        // Deployment
        .route("/api/v1/projects/{id}/install", post(deployment::install))
        .route("/api/v1/projects/{id}/start", post(deployment::start))
        .route("/api/v1/projects/{id}/stop", post(deployment::stop))
        .route("/api/v1/projects/{id}/restart", post(deployment::restart))
        .route("/api/v1/projects/{id}/status", get(deployment::status))
        .route("/api/v1/projects/{id}/usage", get(deployment::usage))
        .route("/api/v1/projects/{id}/logs", get(deployment::logs))
        .route("/api/v1/projects/{id}/audit", get(projects::audit_trail))
        // File browser
        .route("/api/v1/projects/{id}/files", post(files::open_session))
        // Admin
        .route("/api/v1/admin/stats", get(admin::stats))
        .route("/api/v1/admin/tenants", get(admin::list_tenants))
        .route("/api/v1/admin/tenants/{id}", get(admin::get_tenant))
        .route("/api/v1/admin/tenants/{id}/audit", get(admin::tenant_audit))
        .route(
            "/api/v1/admin/tenants/{id}/quota/grant",
            post(admin::grant_quota),
        )
        .route(
            "/api/v1/admin/tenants/{id}/quota/revoke",
            post(admin::revoke_quota),
        )
        // Billing callbacks
        .route(
            "/api/v1/billing/tenants/{id}/slots",
            post(billing::purchase_slot),
        )
        .route(
            "/api/v1/billing/projects/{id}/renew",
            post(billing::renew),
        )
}
