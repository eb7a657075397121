use std::convert::Infallible;

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRef, FromRequest, FromRequestParts, Request},
    http::{header::AUTHORIZATION, request::Parts},
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    auth::{jwt::Claims, repo_types::User, services::AuthService},
    error::AppError,
};

/// Raw token from `Authorization: Bearer <token>`, not yet verified.
pub struct BearerToken(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| {
                warn!("missing Authorization header");
                AppError::Unauthenticated
            })?;

        // Expect "Bearer <token>"
        let token = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                warn!("invalid auth scheme");
                AppError::Unauthenticated
            })?;

        Ok(BearerToken(token.to_string()))
    }
}

/// Verified bearer token resolved to a live user.
pub struct AuthUser {
    pub user: User,
    pub claims: Claims,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AuthService: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let BearerToken(token) = BearerToken::from_request_parts(parts, state).await?;
        let (user, claims) = AuthService::from_ref(state).authenticate(&token).await?;
        Ok(AuthUser { user, claims })
    }
}

/// JSON body that never rejects the request.
///
/// A missing body, a non-JSON content type, malformed JSON or anything other
/// than a JSON object all yield `T::default()`, so absent fields are reported
/// by the service as validation or credential errors instead of axum's
/// plain-text rejections.
pub struct LenientJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for LenientJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Default + Send,
{
    type Rejection = Infallible;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = match Bytes::from_request(req, state).await {
            Ok(b) => b,
            Err(e) => {
                debug!(error = %e, "unreadable request body");
                return Ok(LenientJson(T::default()));
            }
        };

        let value = match serde_json::from_slice::<Value>(&bytes) {
            Ok(v @ Value::Object(_)) => v,
            Ok(_) | Err(_) => {
                debug!(len = bytes.len(), "request body is not a JSON object");
                return Ok(LenientJson(T::default()));
            }
        };

        Ok(LenientJson(serde_json::from_value(value).unwrap_or_default()))
    }
}
