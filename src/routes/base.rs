// ABOUTME: Public base routes: image captcha generation
// ABOUTME: Captcha answers live server-side; the client only sees id + image payload
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use crate::errors::{ApiResponse, AppError, AppResult, ErrorCode};
use crate::resources::ServerResources;
use axum::extract::State;
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use std::sync::Arc;

/// Captcha payload returned to the client
#[derive(Debug, Serialize)]
pub struct CaptchaResponse {
    /// Opaque id echoed back on verification
    pub captcha_id: String,
    /// Base64 image data URI
    pub pic_path: String,
}

/// Public base routes
pub struct BaseRoutes;

impl BaseRoutes {
    /// Create the base router
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/base/captcha", get(Self::handle_captcha))
            .with_state(resources)
    }

    async fn handle_captcha(
        State(resources): State<Arc<ServerResources>>,
    ) -> AppResult<ApiResponse<CaptchaResponse>> {
        let captcha = resources
            .captcha
            .generate()
            .await
            .map_err(|e| AppError::new(ErrorCode::CaptchaGeneration, e.message))?;

        Ok(ApiResponse::success(CaptchaResponse {
            captcha_id: captcha.captcha_id,
            pic_path: captcha.pic_path,
        }))
    }
}
