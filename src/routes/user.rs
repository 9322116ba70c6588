// ABOUTME: User-facing routes: logout, profile fetch/update, password change
// ABOUTME: Logout takes the raw bearer token itself so just-expired tokens still revoke cleanly
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use crate::errors::{ApiResponse, AppError, AppResult};
use crate::middleware::{require_auth, AuthenticatedUser};
use crate::models::UserInfo;
use crate::resources::ServerResources;
use crate::utils::client_ip;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post, put};
use axum::{middleware, Extension, Json, Router};
use serde::Deserialize;
use std::sync::Arc;

/// Profile update body; omitted fields keep their stored values
#[derive(Debug, Deserialize)]
pub struct UpdateUserInfoRequest {
    /// Public nickname
    #[serde(default)]
    pub nickname: Option<String>,
    /// Avatar URL
    #[serde(default)]
    pub avatar: Option<String>,
    /// Address line
    #[serde(default)]
    pub address: Option<String>,
    /// Signature line
    #[serde(default)]
    pub signature: Option<String>,
}

/// Password change body
#[derive(Debug, Deserialize)]
pub struct UpdatePasswordRequest {
    /// Current password
    pub old_password: String,
    /// Replacement password, 8–20 chars
    pub new_password: String,
}

/// User routes
pub struct UserRoutes;

impl UserRoutes {
    /// Create the user router
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        let protected = Router::new()
            .route("/user/info", get(Self::handle_get_info))
            .route("/user/info", put(Self::handle_update_info))
            .route("/user/password", put(Self::handle_update_password))
            .layer(middleware::from_fn_with_state(
                resources.clone(),
                require_auth,
            ));

        // Logout stays outside the guard: an expired access token must still
        // identify the session being revoked
        Router::new()
            .route("/user/logout", post(Self::handle_logout))
            .merge(protected)
            .with_state(resources)
    }

    async fn handle_logout(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
    ) -> AppResult<ApiResponse<()>> {
        let token = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::unauthorized("未提供认证token"))?;

        let ip_address = client_ip(&headers);
        let user_agent = crate::utils::client_ip::user_agent(&headers);

        resources
            .auth_service()
            .logout(token, &ip_address, &user_agent)
            .await?;

        // The SSO session survives an app logout on purpose: other relying
        // apps keep their silent login until the global logout
        Ok(ApiResponse::success_msg("登出成功", None))
    }

    async fn handle_get_info(
        State(resources): State<Arc<ServerResources>>,
        Extension(user): Extension<AuthenticatedUser>,
    ) -> AppResult<ApiResponse<UserInfo>> {
        let info = resources.auth_service().get_user_info(user.user_uuid).await?;
        Ok(ApiResponse::success(info))
    }

    async fn handle_update_info(
        State(resources): State<Arc<ServerResources>>,
        Extension(user): Extension<AuthenticatedUser>,
        Json(req): Json<UpdateUserInfoRequest>,
    ) -> AppResult<ApiResponse<()>> {
        resources
            .auth_service()
            .update_user_info(
                user.user_uuid,
                req.nickname.as_deref().filter(|s| !s.is_empty()),
                req.avatar.as_deref().filter(|s| !s.is_empty()),
                req.address.as_deref().filter(|s| !s.is_empty()),
                req.signature.as_deref().filter(|s| !s.is_empty()),
            )
            .await?;
        Ok(ApiResponse::success_msg("更新成功", None))
    }

    async fn handle_update_password(
        State(resources): State<Arc<ServerResources>>,
        Extension(user): Extension<AuthenticatedUser>,
        Json(req): Json<UpdatePasswordRequest>,
    ) -> AppResult<ApiResponse<()>> {
        let len = req.new_password.chars().count();
        if !(8..=20).contains(&len) {
            return Err(AppError::bad_request("密码长度必须为8-20位"));
        }

        resources
            .auth_service()
            .update_password(user.user_uuid, &req.old_password, &req.new_password)
            .await?;
        Ok(ApiResponse::success_msg("密码修改成功", None))
    }
}
