use axum::extract::State;
use axum::Json;
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};

use crate::auth::extractor::AuthTenant;
use crate::auth::jwt::{Claims, encode_token};
use crate::auth::password;
use crate::config::RegistrationMode;
use crate::db;
use crate::error::AppError;
use crate::middleware::audit;
use crate::models::{AuditResource, Tenant};
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub access_token: String,
}

fn auth_cookie(access_token: &str) -> CookieJar {
    let access = Cookie::build(("access_token", access_token.to_string()))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .build();

    CookieJar::new().add(access)
}

fn issue(state: &SharedState, tenant: &Tenant) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    let claims = Claims::new(tenant.id, tenant.is_system_admin);
    let access_token =
        encode_token(&claims, &state.config.jwt_secret).map_err(AppError::Internal)?;
    Ok((auth_cookie(&access_token), Json(AuthResponse { access_token })))
}

pub async fn register(
    State(state): State<SharedState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    let email = req.email.trim();
    let name = req.name.trim();
    if email.is_empty() || req.password.is_empty() || name.is_empty() {
        return Err(AppError::BadRequest("All fields are required".to_string()));
    }
    if !email.contains('@') {
        return Err(AppError::BadRequest("Invalid email address".to_string()));
    }

    if req.password.len() < password::MIN_LENGTH {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {} characters",
            password::MIN_LENGTH
        )));
    }

    let pw_hash = password::hash(&req.password).map_err(AppError::Internal)?;

    // Advisory lock prevents concurrent bootstrap registrations
    let mut tx = state.pool.begin().await?;
    sqlx::query("SELECT pg_advisory_xact_lock(1)")
        .execute(&mut *tx)
        .await?;

    let bootstrap = db::tenants::count_all(&mut *tx).await? == 0;
    if !bootstrap && state.config.registration == RegistrationMode::Closed {
        return Err(AppError::Forbidden(
            "Registration is disabled. Contact your system administrator.".to_string(),
        ));
    }

    let tenant = db::tenants::create(
        &mut *tx,
        email,
        &pw_hash,
        name,
        state.config.tiers.free_quota,
        bootstrap,
    )
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            AppError::Conflict("An account with this email already exists".to_string())
        }
        _ => AppError::Database(e),
    })?;

    tx.commit().await?;

    if bootstrap {
        tracing::info!(tenant_id = %tenant.id, "Bootstrapped system admin tenant");
    }

    let actor = AuthTenant {
        tenant_id: tenant.id,
        is_system_admin: tenant.is_system_admin,
    };
    audit::log_event(
        &state.pool,
        tenant.id,
        &actor,
        "tenant.registered",
        AuditResource::Tenant(tenant.id),
        None,
    )
    .await;

    issue(&state, &tenant)
}

pub async fn login(
    State(state): State<SharedState>,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    // Rate limit check
    if state.login_limiter.check(&req.email).is_err() {
        return Err(AppError::RateLimited(
            "Too many login attempts. Please try again later.".to_string(),
        ));
    }

    let Some(tenant) = db::tenants::find_by_email(&state.pool, req.email.trim()).await? else {
        state.login_limiter.record_failure(&req.email);
        return Err(AppError::Unauthorized("Invalid credentials".to_string()));
    };

    let valid = password::verify(&req.password, &tenant.password_hash)
        .map_err(AppError::Internal)?;

    if !valid {
        state.login_limiter.record_failure(&req.email);
        return Err(AppError::Unauthorized("Invalid credentials".to_string()));
    }

    issue(&state, &tenant)
}
