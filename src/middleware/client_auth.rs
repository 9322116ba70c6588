// ABOUTME: Client authentication for the internal service-to-service surface
// ABOUTME: X-Client-ID/X-Client-Secret must match a registered, enabled application
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use crate::errors::{AppError, ErrorCode};
use crate::resources::ServerResources;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Application identity attached to internal requests
#[derive(Debug, Clone)]
pub struct ClientApp {
    /// Internal application id
    pub app_id: i64,
    /// External application key
    pub app_key: String,
}

/// Axum middleware authenticating `/internal/*` callers by application
/// credentials. The secret compare is constant-time.
///
/// # Errors
///
/// `Unauthorized` on missing headers, `ClientCredentialsInvalid` on unknown
/// id or wrong secret.
pub async fn require_client_auth(
    State(resources): State<Arc<ServerResources>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let client_id = header_value(&request, "x-client-id")?;
    let client_secret = header_value(&request, "x-client-secret")?;

    let app = resources
        .database
        .get_application_by_key(&client_id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::ClientCredentialsInvalid, "无效的客户端ID"))?;

    if app
        .app_secret
        .as_bytes()
        .ct_eq(client_secret.as_bytes())
        .unwrap_u8()
        != 1
    {
        return Err(AppError::new(
            ErrorCode::ClientCredentialsInvalid,
            "客户端认证失败",
        ));
    }

    request.extensions_mut().insert(ClientApp {
        app_id: app.id,
        app_key: app.app_key,
    });

    Ok(next.run(request).await)
}

fn header_value(request: &Request, name: &str) -> Result<String, AppError> {
    request
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(ToOwned::to_owned)
        .ok_or_else(|| AppError::unauthorized("缺少客户端认证信息"))
}
