// ABOUTME: Bearer access-token guard: blacklist check, RS256 parse, device blacklist check
// ABOUTME: Attaches AuthenticatedUser to the request for downstream handlers
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Access-token validation has three distinguishable outcomes: expired
//! (eligible for refresh), cryptographically invalid (never eligible) and
//! revoked — blacklisted by logout or issued to a blacklisted device.
//! The token blacklist is consulted before the signature check so revoked
//! tokens fail fast regardless of their remaining validity.

use crate::auth::{TokenKind, TokenValidationError};
use crate::cache::keys;
use crate::errors::{AppError, ErrorCode};
use crate::resources::ServerResources;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;
use uuid::Uuid;

/// Identity attached to authenticated requests
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// Subject user
    pub user_uuid: Uuid,
    /// `app_key` the token was issued for
    pub app_key: String,
    /// Device the token is bound to
    pub device_id: String,
}

/// Axum middleware enforcing a valid, unrevoked bearer access token
///
/// # Errors
///
/// `Unauthorized`, `TokenExpired`, `TokenInvalid`, `TokenRevoked` or
/// `DeviceRevoked` depending on what rejected the request.
pub async fn require_auth(
    State(resources): State<Arc<ServerResources>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&request)?;

    if resources.kv.exists(&keys::token_blacklist(&token)).await? {
        return Err(AppError::from_code(ErrorCode::TokenRevoked));
    }

    let claims = resources
        .codec
        .parse(TokenKind::Access, &token)
        .map_err(|e| match e {
            TokenValidationError::Expired => AppError::from_code(ErrorCode::TokenExpired),
            _ => AppError::from_code(ErrorCode::TokenInvalid),
        })?;

    if resources
        .kv
        .exists(&keys::device_blacklist(&claims.device_id))
        .await?
    {
        return Err(AppError::from_code(ErrorCode::DeviceRevoked));
    }

    request.extensions_mut().insert(AuthenticatedUser {
        user_uuid: claims.user_uuid,
        app_key: claims.app_id,
        device_id: claims.device_id,
    });

    Ok(next.run(request).await)
}

/// Extract the raw bearer token from a request's Authorization header
///
/// # Errors
///
/// `Unauthorized` when the header is missing or not `Bearer ...`.
pub fn bearer_token(request: &Request) -> Result<String, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::unauthorized("未提供认证token"))?;

    header
        .strip_prefix("Bearer ")
        .filter(|token| !token.is_empty())
        .map(ToOwned::to_owned)
        .ok_or_else(|| AppError::unauthorized("token格式错误"))
}
