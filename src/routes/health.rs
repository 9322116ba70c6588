// ABOUTME: Health endpoint reporting database and KV connectivity
// ABOUTME: Degraded dependencies answer 503 so load balancers stop routing here
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use crate::resources::ServerResources;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    database: &'static str,
    kv: &'static str,
}

/// Health-check routes
pub struct HealthRoutes;

impl HealthRoutes {
    /// Create the health router (mounted outside the API prefix)
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/health", get(Self::handle_health))
            .with_state(resources)
    }

    async fn handle_health(State(resources): State<Arc<ServerResources>>) -> Response {
        let database_ok = resources.database.health_check().await.is_ok();
        let kv_ok = resources.kv.health_check().await.is_ok();

        let body = HealthResponse {
            status: if database_ok && kv_ok { "ok" } else { "degraded" },
            database: if database_ok { "ok" } else { "unreachable" },
            kv: if kv_ok { "ok" } else { "unreachable" },
        };

        let status = if database_ok && kv_ok {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };

        (status, Json(body)).into_response()
    }
}
