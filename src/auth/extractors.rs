use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use axum_extra::extract::CookieJar;
use tracing::warn;

use super::{repo::Identity, services::{resolve, ResolveError}};
use crate::{error::AppError, state::AppState};

pub const TOKEN_COOKIE: &str = "token";

/// Bearer header first, then the `token` cookie.
fn token_from_parts(parts: &Parts) -> Option<String> {
    let bearer = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    bearer.or_else(|| {
        CookieJar::from_headers(&parts.headers)
            .get(TOKEN_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|t| !t.is_empty())
    })
}

async fn identity_for(state: &AppState, token: &str) -> Result<Identity, AppError> {
    resolve(state, token).await.map_err(|e| match e {
        ResolveError::Store(e) => AppError::Internal(e.into()),
        other => {
            warn!(reason = %other, "rejected token");
            AppError::Unauthorized("Invalid or expired token".into())
        }
    })
}

/// Required authentication: the request stops here without a valid token.
pub struct AuthUser(pub Identity);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = token_from_parts(parts)
            .ok_or_else(|| AppError::Unauthorized("No token provided".into()))?;
        Ok(AuthUser(identity_for(state, &token).await?))
    }
}

/// Optional authentication: absent token is `None`, a bad token is still rejected.
pub struct MaybeAuthUser(pub Option<Identity>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match token_from_parts(parts) {
            Some(token) => Ok(MaybeAuthUser(Some(identity_for(state, &token).await?))),
            None => Ok(MaybeAuthUser(None)),
        }
    }
}
