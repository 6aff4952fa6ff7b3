use std::sync::Arc;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use crate::{error::AppError, models::{Role, User}, AppState};

pub const USER_ID_HEADER: &str = "x-user-id";

/// The registered user named by the `X-User-Id` header.
///
/// This only identifies the caller; it does not authenticate them.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::Unauthorized("missing X-User-Id header".to_string()))?;

        let user = state
            .store
            .get_user(user_id)?
            .ok_or_else(|| AppError::Unauthorized(format!("unknown user {}", user_id)))?;

        if !user.is_active {
            return Err(AppError::Forbidden("account is deactivated".to_string()));
        }
        Ok(CurrentUser(user))
    }
}

/// A [`CurrentUser`] holding the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if user.role != Role::Admin {
            tracing::warn!(user_id = %user.id, "non-admin attempted admin access");
            return Err(AppError::Forbidden("admin access required".to_string()));
        }
        Ok(AdminUser(user))
    }
}
