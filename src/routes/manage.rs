// ABOUTME: Manage surface: device listing, manual kicks, SSO/global logout, audit logs, profile
// ABOUTME: Every route requires a valid bearer token; self-kick is refused at this layer
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use crate::database::LogFilter;
use crate::errors::{ApiResponse, AppError, AppResult, ErrorCode};
use crate::middleware::{require_auth, AuthenticatedUser};
use crate::models::{DeviceInfo, LogInfo, PageResponse, UserInfo};
use crate::resources::ServerResources;
use crate::utils::client_ip;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Extension, Json, Router};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// Kick request body
#[derive(Debug, Deserialize)]
pub struct KickDeviceRequest {
    /// Device to force offline
    pub device_id: String,
}

/// Log listing query parameters
#[derive(Debug, Deserialize, Default)]
pub struct LogQueryParams {
    /// 1-based page index
    #[serde(default)]
    pub page: i64,
    /// Rows per page
    #[serde(default)]
    pub page_size: i64,
    /// Restrict to one action tag
    #[serde(default)]
    pub action: Option<String>,
    /// RFC3339 inclusive lower bound
    #[serde(default)]
    pub start_time: Option<String>,
    /// RFC3339 inclusive upper bound
    #[serde(default)]
    pub end_time: Option<String>,
}

/// Manage routes
pub struct ManageRoutes;

impl ManageRoutes {
    /// Create the manage router with the bearer guard applied
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/manage/devices", get(Self::handle_devices))
            .route("/manage/kick-device", post(Self::handle_kick_device))
            .route("/manage/logout", post(Self::handle_app_logout))
            .route("/manage/sso-logout", post(Self::handle_sso_logout))
            .route("/manage/logout-all", post(Self::handle_logout_all))
            .route("/manage/logs", get(Self::handle_logs))
            .route("/manage/profile", get(Self::handle_profile))
            .layer(middleware::from_fn_with_state(
                resources.clone(),
                require_auth,
            ))
            .with_state(resources)
    }

    async fn handle_devices(
        State(resources): State<Arc<ServerResources>>,
        Extension(user): Extension<AuthenticatedUser>,
    ) -> AppResult<ApiResponse<Vec<DeviceInfo>>> {
        let devices = resources
            .manage_service()
            .get_user_devices(user.user_uuid, &user.device_id)
            .await?;
        Ok(ApiResponse::success(devices))
    }

    async fn handle_kick_device(
        State(resources): State<Arc<ServerResources>>,
        Extension(user): Extension<AuthenticatedUser>,
        headers: HeaderMap,
        Json(req): Json<KickDeviceRequest>,
    ) -> AppResult<ApiResponse<()>> {
        if req.device_id.is_empty() {
            return Err(AppError::bad_request("缺少device_id"));
        }
        if req.device_id == user.device_id {
            return Err(AppError::from_code(ErrorCode::KickCurrentDevice));
        }

        resources
            .manage_service()
            .kick_device(
                user.user_uuid,
                &req.device_id,
                &client_ip(&headers),
                &crate::utils::client_ip::user_agent(&headers),
            )
            .await?;

        Ok(ApiResponse::success_msg("设备已踢出", None))
    }

    async fn handle_app_logout(
        State(resources): State<Arc<ServerResources>>,
        Extension(user): Extension<AuthenticatedUser>,
        headers: HeaderMap,
    ) -> AppResult<ApiResponse<serde_json::Value>> {
        resources
            .manage_service()
            .app_logout(
                user.user_uuid,
                &user.device_id,
                &client_ip(&headers),
                &crate::utils::client_ip::user_agent(&headers),
            )
            .await?;

        // The SSO session stays; only this app's credentials were revoked
        Ok(ApiResponse::success_msg(
            "退出成功",
            Some(json!({ "redirect_to": format!("/login?app_id={}", user.app_key) })),
        ))
    }

    async fn handle_sso_logout(
        State(resources): State<Arc<ServerResources>>,
        Extension(user): Extension<AuthenticatedUser>,
        headers: HeaderMap,
        jar: CookieJar,
    ) -> AppResult<Response> {
        resources
            .manage_service()
            .sso_logout(
                user.user_uuid,
                &user.device_id,
                &client_ip(&headers),
                &crate::utils::client_ip::user_agent(&headers),
            )
            .await?;

        let jar = resources.sessions.clear(jar).await?;

        let body = ApiResponse::success_msg(
            "SSO退出成功",
            Some(json!({ "redirect_to": format!("/login?app_id={}", user.app_key) })),
        );
        Ok((jar, body).into_response())
    }

    async fn handle_logout_all(
        State(resources): State<Arc<ServerResources>>,
        Extension(user): Extension<AuthenticatedUser>,
        headers: HeaderMap,
        jar: CookieJar,
    ) -> AppResult<Response> {
        let kicked = resources
            .manage_service()
            .logout_all_devices(
                user.user_uuid,
                &client_ip(&headers),
                &crate::utils::client_ip::user_agent(&headers),
            )
            .await?;

        let jar = resources.sessions.clear(jar).await?;

        let body = ApiResponse::success(json!({
            "message": "已退出所有设备",
            "kicked_count": kicked,
        }));
        Ok((jar, body).into_response())
    }

    async fn handle_logs(
        State(resources): State<Arc<ServerResources>>,
        Extension(user): Extension<AuthenticatedUser>,
        Query(params): Query<LogQueryParams>,
    ) -> AppResult<ApiResponse<PageResponse<LogInfo>>> {
        let filter = LogFilter {
            action: params.action.clone().filter(|a| !a.is_empty()),
            start_time: parse_time(params.start_time.as_deref())?,
            end_time: parse_time(params.end_time.as_deref())?,
            page: params.page,
            page_size: params.page_size,
        };

        let logs = resources
            .manage_service()
            .get_operation_logs(user.user_uuid, &filter)
            .await?;
        Ok(ApiResponse::success(logs))
    }

    async fn handle_profile(
        State(resources): State<Arc<ServerResources>>,
        Extension(user): Extension<AuthenticatedUser>,
    ) -> AppResult<ApiResponse<UserInfo>> {
        let info = resources.auth_service().get_user_info(user.user_uuid).await?;
        Ok(ApiResponse::success(info))
    }
}

fn parse_time(raw: Option<&str>) -> AppResult<Option<DateTime<Utc>>> {
    match raw {
        None | Some("") => Ok(None),
        Some(value) => DateTime::parse_from_rfc3339(value)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|_| AppError::bad_request("时间格式错误，应为RFC3339")),
    }
}
