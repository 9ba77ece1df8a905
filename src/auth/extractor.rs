use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::CookieJar;
use uuid::Uuid;

use crate::auth::jwt;
use crate::error::AppError;
use crate::models::Project;
use crate::runtime::LifecycleError;
use crate::state::SharedState;

#[derive(Debug, Clone)]
pub struct AuthTenant {
    pub tenant_id: Uuid,
    pub is_system_admin: bool,
}

impl AuthTenant {
    pub fn require_system_admin(&self) -> Result<(), AppError> {
        if self.is_system_admin {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "System admin access required".to_string(),
            ))
        }
    }

    /// Tenants may only touch their own projects. System admins may touch any.
    pub fn require_owner(&self, project: &Project) -> Result<(), LifecycleError> {
        if self.is_system_admin || project.tenant_id == self.tenant_id {
            Ok(())
        } else {
            Err(LifecycleError::AccessDenied)
        }
    }
}

impl FromRequestParts<SharedState> for AuthTenant {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        // Try Bearer token from Authorization header first
        if let Some(auth_header) = parts.headers.get("authorization") {
            let auth_str = auth_header
                .to_str()
                .map_err(|_| AppError::Unauthorized("Invalid authorization header".to_string()))?;

            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                let claims = jwt::decode_token(token, &state.config.jwt_secret)
                    .map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))?;

                return Ok(AuthTenant {
                    tenant_id: claims.sub,
                    is_system_admin: claims.adm,
                });
            }
        }

        let jar = CookieJar::from_headers(&parts.headers);
        if let Some(cookie) = jar.get("access_token") {
            let claims = jwt::decode_token(cookie.value(), &state.config.jwt_secret)
                .map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))?;

            return Ok(AuthTenant {
                tenant_id: claims.sub,
                is_system_admin: claims.adm,
            });
        }

        Err(AppError::Unauthorized(
            "Missing authentication token".to_string(),
        ))
    }
}
