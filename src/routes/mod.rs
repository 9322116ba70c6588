// ABOUTME: Route module organization for the SSO HTTP surface
// ABOUTME: One router per domain; handlers stay thin and delegate to services
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! HTTP routes organized by domain. Every router is a
//! `XxxRoutes::routes(Arc<ServerResources>) -> Router` and every response
//! uses the `{code, msg, data}` envelope except the OAuth redirects.

pub mod auth;
pub mod base;
pub mod health;
pub mod internal;
pub mod manage;
pub mod oauth;
pub mod user;

pub use auth::AuthRoutes;
pub use base::BaseRoutes;
pub use health::HealthRoutes;
pub use internal::InternalRoutes;
pub use manage::ManageRoutes;
pub use oauth::OAuthRoutes;
pub use user::UserRoutes;

use crate::errors::AppError;
use axum::http::{header::LOCATION, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

/// 302 Found redirect; the OAuth hops use 302 specifically, not axum's 303/307
pub(crate) fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => {
            let mut response = StatusCode::FOUND.into_response();
            response.headers_mut().insert(LOCATION, value);
            response
        }
        Err(_) => AppError::bad_request("非法的跳转地址").into_response(),
    }
}
