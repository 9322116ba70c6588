// ABOUTME: Internal service-to-service surface: user lookup by uuid
// ABOUTME: Guarded by X-Client-ID/X-Client-Secret application credentials
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use crate::errors::{ApiResponse, AppError, AppResult};
use crate::middleware::{require_client_auth, ClientApp};
use crate::models::UserInfo;
use crate::resources::ServerResources;
use axum::extract::{Path, State};
use axum::routing::get;
use axum::{middleware, Extension, Router};
use std::sync::Arc;
use uuid::Uuid;

/// Internal routes for relying-app backends
pub struct InternalRoutes;

impl InternalRoutes {
    /// Create the internal router with client authentication applied
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/internal/user/:uuid", get(Self::handle_user_by_uuid))
            .layer(middleware::from_fn_with_state(
                resources.clone(),
                require_client_auth,
            ))
            .with_state(resources)
    }

    async fn handle_user_by_uuid(
        State(resources): State<Arc<ServerResources>>,
        Extension(client): Extension<ClientApp>,
        Path(uuid): Path<String>,
    ) -> AppResult<ApiResponse<UserInfo>> {
        let user_uuid =
            Uuid::parse_str(&uuid).map_err(|_| AppError::bad_request("无效的UUID格式"))?;

        tracing::debug!(client = %client.app_key, user_uuid = %user_uuid, "internal user lookup");

        let info = resources.auth_service().get_user_info(user_uuid).await?;
        Ok(ApiResponse::success(info))
    }
}
