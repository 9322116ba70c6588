// ABOUTME: OAuth authorize endpoint implementing the silent-login decision, plus the app directory
// ABOUTME: Session present and device inside its window means a token pair without user interaction
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Authorize Endpoint
//!
//! `GET /oauth/authorize` is where the silent-login decision happens. With no
//! usable session the browser is bounced to the login page, parameters
//! preserved. With a session, the device behind `sso_device_id` passes the
//! sliding-expiry check (a first visit to the app is fine — token issuance
//! registers the device), a fresh token pair is minted, an authorization code
//! is issued and the browser is 302-redirected back to the relying app.
//!
//! UA/IP drift against the session is logged but allowed by default —
//! observant, not strict; `SESSION_STRICT_BINDING` flips it.

use crate::errors::{ApiResponse, AppError, AppResult, ErrorCode};
use crate::models::{ApplicationInfo, LoginAction, SessionData};
use crate::resources::ServerResources;
use crate::routes::found;
use crate::services::devices::DeviceDescriptor;
use crate::utils::client_ip;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

/// Authorize query parameters
#[derive(Debug, Deserialize)]
pub struct AuthorizeQuery {
    /// Requesting application
    #[serde(default)]
    pub app_id: String,
    /// Callback the code is delivered to
    #[serde(default)]
    pub redirect_uri: String,
    /// State envelope, echoed back to the relying app
    #[serde(default)]
    pub state: String,
}

/// OAuth routes
pub struct OAuthRoutes;

impl OAuthRoutes {
    /// Create the oauth router
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/oauth/authorize", get(Self::handle_authorize))
            .route("/oauth/applications", get(Self::handle_applications))
            .with_state(resources)
    }

    async fn handle_authorize(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        jar: CookieJar,
        Query(query): Query<AuthorizeQuery>,
    ) -> AppResult<Response> {
        if query.app_id.is_empty() || query.redirect_uri.is_empty() {
            return Err(AppError::bad_request("缺少必要参数"));
        }

        let Some(session) = resources.sessions.load(&jar).await? else {
            return Ok(login_redirect(&resources, &query));
        };
        if !session.logged_in {
            return Ok(login_redirect(&resources, &query));
        }

        if session.sso_device_id.is_empty() {
            tracing::warn!("session missing sso_device_id, forcing re-login");
            return Ok(login_redirect(&resources, &query));
        }

        let Ok(user_uuid) = Uuid::parse_str(&session.user_uuid) else {
            tracing::warn!("session carries unparsable user uuid, forcing re-login");
            let jar = resources.sessions.clear(jar).await?;
            return Ok((jar, login_redirect(&resources, &query)).into_response());
        };

        if let Some(response) =
            Self::check_session_binding(&resources, &headers, &session, jar.clone(), &query).await?
        {
            return Ok(response);
        }

        let Some(app) = resources
            .database
            .get_application_by_key(&query.app_id)
            .await?
        else {
            tracing::warn!(app_id = %query.app_id, "authorize for unknown app, forcing login");
            return Ok(login_redirect(&resources, &query));
        };

        let devices = resources.device_manager();

        // A kicked device stays out of the silent path until its blacklist
        // entry expires; only a fresh credentialed login lifts it earlier
        if devices.is_blacklisted(&session.sso_device_id).await? {
            tracing::warn!(
                user_uuid = %user_uuid,
                device_id = %session.sso_device_id,
                "silent login denied for blacklisted device"
            );
            let jar = resources.sessions.clear(jar).await?;
            return Ok((jar, login_redirect(&resources, &query)).into_response());
        }

        match devices
            .check_sliding_expiry(user_uuid, app.id, &session.sso_device_id)
            .await
        {
            Ok(()) => {}
            Err(e) if e.code == ErrorCode::DeviceNotFound => {
                // First visit to this app from this browser; token issuance
                // will register the device
                tracing::info!(
                    user_uuid = %user_uuid,
                    device_id = %session.sso_device_id,
                    app_id = %query.app_id,
                    "silent login registering first device for app"
                );
            }
            Err(e) if e.code == ErrorCode::DeviceExpired => {
                tracing::warn!(
                    user_uuid = %user_uuid,
                    device_id = %session.sso_device_id,
                    "device expired, clearing session"
                );
                let jar = resources.sessions.clear(jar).await?;
                return Ok((jar, login_redirect(&resources, &query)).into_response());
            }
            Err(e) => return Err(e),
        }

        let ip_address = client_ip(&headers);
        let user_agent = crate::utils::client_ip::user_agent(&headers);

        let tokens = resources
            .auth_service()
            .issue_tokens_for_user(
                user_uuid,
                &query.app_id,
                &DeviceDescriptor {
                    device_id: session.sso_device_id.clone(),
                    device_name: "SSO 设备".to_owned(),
                    device_type: "web".to_owned(),
                    ip_address: ip_address.clone(),
                    user_agent: user_agent.clone(),
                },
            )
            .await?;

        resources
            .auth_service()
            .log_action(&crate::database::NewLoginLog {
                user_uuid,
                app_id: app.id,
                action: LoginAction::SilentLogin.as_str(),
                device_id: &session.sso_device_id,
                ip_address: &ip_address,
                user_agent: &user_agent,
                status: 1,
                message: "SSO静默登录成功",
            })
            .await;

        let code = resources
            .code_broker()
            .issue_code(
                &session.user_uuid,
                &query.app_id,
                &query.redirect_uri,
                &tokens.access_token,
                &tokens.refresh_token,
            )
            .await?;

        let mut callback = format!("{}?code={code}", query.redirect_uri);
        if !query.state.is_empty() {
            callback.push_str("&state=");
            callback.push_str(&query.state);
        }

        Ok(found(&callback))
    }

    /// Compare the session's UA/IP against the request. Observant by
    /// default: drift is logged at warn and allowed. Strict deployments
    /// clear the session and force re-authentication.
    async fn check_session_binding(
        resources: &Arc<ServerResources>,
        headers: &HeaderMap,
        session: &SessionData,
        jar: CookieJar,
        query: &AuthorizeQuery,
    ) -> AppResult<Option<Response>> {
        let current_ua = crate::utils::client_ip::user_agent(headers);
        let current_ip = client_ip(headers);

        let ua_drift = !session.user_agent.is_empty() && session.user_agent != current_ua;
        let ip_drift = !session.ip_address.is_empty() && session.ip_address != current_ip;

        if ua_drift {
            tracing::warn!(
                user_uuid = %session.user_uuid,
                session_ua = %session.user_agent,
                current_ua = %current_ua,
                "silent login user-agent changed"
            );
        }
        if ip_drift {
            tracing::warn!(
                user_uuid = %session.user_uuid,
                session_ip = %session.ip_address,
                current_ip = %current_ip,
                "silent login ip address changed"
            );
        }

        if (ua_drift || ip_drift) && resources.sessions.strict_binding() {
            let jar = resources.sessions.clear(jar).await?;
            return Ok(Some(
                (jar, login_redirect(resources, query)).into_response(),
            ));
        }

        Ok(None)
    }

    async fn handle_applications(
        State(resources): State<Arc<ServerResources>>,
    ) -> AppResult<ApiResponse<Vec<ApplicationInfo>>> {
        let apps = resources.database.list_enabled_applications().await?;
        Ok(ApiResponse::success(
            apps.iter().map(ApplicationInfo::from).collect(),
        ))
    }
}

/// 302 to the login page with the authorize parameters preserved
fn login_redirect(resources: &ServerResources, query: &AuthorizeQuery) -> Response {
    let mut url = format!(
        "{}?app_id={}&redirect_uri={}",
        resources.config.login_url,
        urlencoding::encode(&query.app_id),
        urlencoding::encode(&query.redirect_uri)
    );
    if !query.state.is_empty() {
        url.push_str("&state=");
        url.push_str(&urlencoding::encode(&query.state));
    }
    found(&url)
}
