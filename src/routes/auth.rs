// ABOUTME: Authentication route handlers: register, login, token endpoint, QQ federation, email codes
// ABOUTME: Thin wrappers that validate input, delegate to services and set the SSO session
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! The interactive login surface. Password login demands an image captcha;
//! email-code login does not. A successful login both sets the SSO session
//! cookie (for later silent authorizes) and answers with an authorization
//! code bound to the state's redirect target.

use crate::errors::{ApiResponse, AppError, AppResult, ErrorCode};
use crate::models::SessionData;
use crate::resources::ServerResources;
use crate::routes::found;
use crate::services::devices::DeviceDescriptor;
use crate::services::federated::FederatedLoginParams;
use crate::utils::{client_ip, device_name_from_user_agent};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Registration request body
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    /// Login email
    pub email: String,
    /// Plaintext password, 8–20 chars
    pub password: String,
    /// Public nickname
    pub nickname: String,
    /// App the registration happens on behalf of
    pub app_id: String,
    /// Captcha id from `/base/captcha`
    pub captcha_id: String,
    /// Captcha answer
    pub captcha: String,
}

/// Login request body; `state` carries device id and redirect target
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Login email
    pub email: String,
    /// Password-login secret
    #[serde(default)]
    pub password: Option<String>,
    /// Email-code-login secret
    #[serde(default)]
    pub verification_code: Option<String>,
    /// State envelope from the authorize redirect
    pub state: String,
    /// Requesting application; must match the state's `app_id`
    pub app_id: String,
    /// Display device name
    #[serde(default)]
    pub device_name: Option<String>,
    /// web / ios / android
    #[serde(default)]
    pub device_type: Option<String>,
    /// Captcha id, required for password login
    #[serde(default)]
    pub captcha_id: Option<String>,
    /// Captcha answer, required for password login
    #[serde(default)]
    pub captcha: Option<String>,
}

/// Unified OAuth2 token endpoint body
#[derive(Debug, Deserialize)]
pub struct TokenExchangeRequest {
    /// `authorization_code` or `refresh_token`
    pub grant_type: String,
    /// Code to redeem (`authorization_code`)
    #[serde(default)]
    pub code: Option<String>,
    /// Token to rotate (`refresh_token`)
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Application key
    pub client_id: String,
    /// Application secret
    pub client_secret: String,
    /// Redirect target the code was bound to (`authorization_code`)
    #[serde(default)]
    pub redirect_uri: Option<String>,
}

/// QQ login request body (SPA variant of the GET callback)
#[derive(Debug, Deserialize)]
pub struct QqLoginRequest {
    /// Authorization code from QQ
    pub code: String,
    /// Requesting application
    pub app_id: String,
    /// Redirect target the issued code is bound to
    pub redirect_uri: String,
    /// Client-minted device id
    #[serde(default)]
    pub device_id: Option<String>,
    /// Display device name
    #[serde(default)]
    pub device_name: Option<String>,
    /// web / ios / android
    #[serde(default)]
    pub device_type: Option<String>,
}

/// QQ callback query parameters
#[derive(Debug, Deserialize)]
pub struct QqCallbackQuery {
    /// Authorization code from QQ
    #[serde(default)]
    pub code: String,
    /// App key appended to the callback by the login-URL builder
    #[serde(default)]
    pub app_id: String,
    /// State envelope echoed by QQ
    #[serde(default)]
    pub state: String,
}

/// QQ login-URL query parameters
#[derive(Debug, Deserialize)]
pub struct QqLoginUrlQuery {
    /// Requesting application
    #[serde(default)]
    pub app_id: String,
    /// State envelope carried through the provider
    #[serde(default)]
    pub state: Option<String>,
}

/// Email verification-code request body
#[derive(Debug, Deserialize)]
pub struct SendEmailCodeRequest {
    /// Recipient
    pub email: String,
    /// Captcha id
    pub captcha_id: String,
    /// Captcha answer
    pub captcha: String,
}

/// Forgot-password request body
#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    /// Account email
    pub email: String,
    /// Verification code received by mail
    pub verification_code: String,
    /// Replacement password, 8–20 chars
    pub new_password: String,
}

/// Authentication routes
pub struct AuthRoutes;

impl AuthRoutes {
    /// Create the auth router
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/auth/register", post(Self::handle_register))
            .route("/auth/login", post(Self::handle_login))
            .route("/auth/token", post(Self::handle_token))
            .route("/auth/oauth/qq/login", post(Self::handle_qq_login))
            .route("/auth/oauth/qq/callback", get(Self::handle_qq_callback))
            .route("/auth/qqLoginURL", get(Self::handle_qq_login_url))
            .route(
                "/auth/sendEmailVerificationCode",
                post(Self::handle_send_email_code),
            )
            .route("/auth/forgotPassword", post(Self::handle_forgot_password))
            .with_state(resources)
    }

    async fn handle_register(
        State(resources): State<Arc<ServerResources>>,
        Json(req): Json<RegisterRequest>,
    ) -> AppResult<ApiResponse<()>> {
        if req.email.is_empty() || req.nickname.is_empty() {
            return Err(AppError::bad_request("参数错误: 邮箱和昵称不能为空"));
        }
        check_password_shape(&req.password)?;

        if !resources.captcha.verify(&req.captcha_id, &req.captcha).await? {
            return Err(AppError::from_code(ErrorCode::CaptchaInvalid));
        }

        resources
            .auth_service()
            .register(&crate::services::auth::RegisterParams {
                email: req.email,
                password: req.password,
                nickname: req.nickname,
                app_key: req.app_id,
            })
            .await?;

        Ok(ApiResponse::success_msg("注册成功，请登录", None))
    }

    async fn handle_login(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        jar: CookieJar,
        Json(req): Json<LoginRequest>,
    ) -> AppResult<Response> {
        // Verify and consume the state first; it binds this login attempt to
        // its originating authorize request
        let state_data = resources.state.verify(&req.state).await?;
        if state_data.app_id != req.app_id {
            return Err(AppError::bad_request("app_id参数与state中的app_id不一致"));
        }

        match (&req.password, &req.verification_code) {
            (Some(_), _) => {
                let (Some(captcha_id), Some(captcha)) = (&req.captcha_id, &req.captcha) else {
                    return Err(AppError::bad_request("密码登录需要图片验证码"));
                };
                if !resources.captcha.verify(captcha_id, captcha).await? {
                    return Err(AppError::from_code(ErrorCode::CaptchaInvalid));
                }
            }
            (None, Some(_)) => {} // email-code login, verified in the service
            (None, None) => {
                return Err(AppError::bad_request("请提供密码或邮箱验证码"));
            }
        }

        let ip_address = client_ip(&headers);
        let user_agent = crate::utils::client_ip::user_agent(&headers);

        let response = resources
            .auth_service()
            .login(&crate::services::auth::LoginParams {
                email: req.email.clone(),
                password: req.password.clone(),
                verification_code: req.verification_code.clone(),
                app_key: req.app_id.clone(),
                device: DeviceDescriptor {
                    device_id: state_data.device_id.clone(),
                    device_name: req.device_name.clone().unwrap_or_default(),
                    device_type: req.device_type.clone().unwrap_or_default(),
                    ip_address: ip_address.clone(),
                    user_agent: user_agent.clone(),
                },
            })
            .await?;

        let user_info = response
            .user_info
            .as_ref()
            .ok_or_else(|| AppError::internal("login response missing user info"))?;

        let jar = resources
            .sessions
            .save(
                jar,
                &SessionData {
                    user_uuid: user_info.uuid.clone(),
                    // The minted token carries the effective device id even
                    // when the state envelope left it for the server to mint
                    sso_device_id: device_id_from_access_token(&resources, &response.access_token),
                    user_agent,
                    ip_address,
                    logged_in: true,
                    logged_in_at: Utc::now().timestamp(),
                },
            )
            .await?;

        let code = resources
            .code_broker()
            .issue_code(
                &user_info.uuid,
                &req.app_id,
                &state_data.redirect_uri,
                &response.access_token,
                &response.refresh_token,
            )
            .await?;

        let body = ApiResponse::success(json!({
            "code": code,
            "redirect_uri": state_data.redirect_uri,
            "return_url": state_data.return_url,
        }));

        Ok((jar, body).into_response())
    }

    async fn handle_token(
        State(resources): State<Arc<ServerResources>>,
        Json(req): Json<TokenExchangeRequest>,
    ) -> AppResult<ApiResponse<serde_json::Value>> {
        match req.grant_type.as_str() {
            "authorization_code" => {
                // The caller's credentials gate code redemption
                let app = resources
                    .database
                    .get_application_by_key(&req.client_id)
                    .await?
                    .ok_or_else(|| AppError::from_code(ErrorCode::ClientCredentialsInvalid))?;
                if app
                    .app_secret
                    .as_bytes()
                    .ct_eq(req.client_secret.as_bytes())
                    .unwrap_u8()
                    != 1
                {
                    return Err(AppError::from_code(ErrorCode::ClientCredentialsInvalid));
                }

                let code = req
                    .code
                    .as_deref()
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| AppError::bad_request("缺少code"))?;
                let redirect_uri = req.redirect_uri.as_deref().unwrap_or_default();

                let record = resources
                    .code_broker()
                    .consume_code(code, &req.client_id, redirect_uri)
                    .await?;

                Ok(ApiResponse::success(json!({
                    "access_token": record.access_token,
                    "refresh_token": record.refresh_token,
                    "token_type": "Bearer",
                    "expires_in": resources.codec.access_ttl_secs(),
                })))
            }
            "refresh_token" => {
                // Credential validation happens inside the service so the
                // app_key binding check can fire before the secret check
                let refresh_token = req.refresh_token.as_deref().unwrap_or_default();
                let response = resources
                    .auth_service()
                    .refresh_token(refresh_token, &req.client_id, &req.client_secret)
                    .await?;
                Ok(ApiResponse::success(serde_json::to_value(response)?))
            }
            other => Err(AppError::bad_request(format!("不支持的grant_type: {other}"))),
        }
    }

    async fn handle_qq_login(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        jar: CookieJar,
        Json(req): Json<QqLoginRequest>,
    ) -> AppResult<Response> {
        if !resources.config.qq.enable {
            return Err(AppError::from_code(ErrorCode::QqLoginDisabled));
        }

        let ip_address = client_ip(&headers);
        let user_agent = crate::utils::client_ip::user_agent(&headers);

        let response = resources
            .federated_service()
            .login(&FederatedLoginParams {
                provider: "qq".to_owned(),
                code: req.code,
                app_key: req.app_id.clone(),
                device: DeviceDescriptor {
                    device_id: req.device_id.unwrap_or_default(),
                    device_name: req.device_name.unwrap_or_default(),
                    device_type: req.device_type.unwrap_or_default(),
                    ip_address: ip_address.clone(),
                    user_agent: user_agent.clone(),
                },
            })
            .await?;

        let user_info = response
            .user_info
            .as_ref()
            .ok_or_else(|| AppError::internal("federated login response missing user info"))?;

        let jar = resources
            .sessions
            .save(
                jar,
                &SessionData {
                    user_uuid: user_info.uuid.clone(),
                    // The access token carries the effective device id
                    sso_device_id: device_id_from_access_token(&resources, &response.access_token),
                    user_agent,
                    ip_address,
                    logged_in: true,
                    logged_in_at: Utc::now().timestamp(),
                },
            )
            .await?;

        let code = resources
            .code_broker()
            .issue_code(
                &user_info.uuid,
                &req.app_id,
                &req.redirect_uri,
                &response.access_token,
                &response.refresh_token,
            )
            .await?;

        let body = ApiResponse::success(json!({
            "code": code,
            "redirect_uri": req.redirect_uri,
        }));

        Ok((jar, body).into_response())
    }

    async fn handle_qq_callback(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        jar: CookieJar,
        Query(query): Query<QqCallbackQuery>,
    ) -> AppResult<Response> {
        if !resources.config.qq.enable {
            return Err(AppError::from_code(ErrorCode::QqLoginDisabled));
        }
        if query.code.is_empty() {
            return Err(AppError::bad_request("缺少code"));
        }
        if query.app_id.trim().is_empty() {
            return Err(AppError::bad_request("缺少app_id"));
        }
        if query.state.is_empty() {
            return Err(AppError::bad_request("缺少state参数"));
        }

        let state_data = resources.state.verify(&query.state).await?;
        // Defense against redirect rewriting between QQ and the SSO
        if state_data.app_id != query.app_id {
            return Err(AppError::bad_request("app_id不匹配"));
        }

        let ip_address = client_ip(&headers);
        let user_agent = crate::utils::client_ip::user_agent(&headers);

        let response = resources
            .federated_service()
            .login(&FederatedLoginParams {
                provider: "qq".to_owned(),
                code: query.code,
                app_key: state_data.app_id.clone(),
                device: DeviceDescriptor {
                    device_id: state_data.device_id.clone(),
                    device_name: device_name_from_user_agent(&user_agent),
                    device_type: "web".to_owned(),
                    ip_address: ip_address.clone(),
                    user_agent: user_agent.clone(),
                },
            })
            .await?;

        let user_info = response
            .user_info
            .as_ref()
            .ok_or_else(|| AppError::internal("federated login response missing user info"))?;

        let jar = resources
            .sessions
            .save(
                jar,
                &SessionData {
                    user_uuid: user_info.uuid.clone(),
                    sso_device_id: device_id_from_access_token(&resources, &response.access_token),
                    user_agent,
                    ip_address,
                    logged_in: true,
                    logged_in_at: Utc::now().timestamp(),
                },
            )
            .await?;

        let code = resources
            .code_broker()
            .issue_code(
                &user_info.uuid,
                &state_data.app_id,
                &state_data.redirect_uri,
                &response.access_token,
                &response.refresh_token,
            )
            .await?;

        let mut redirect = format!("{}?code={code}", state_data.redirect_uri);
        if !state_data.return_url.is_empty() {
            redirect.push_str("&return_url=");
            redirect.push_str(&urlencoding::encode(&state_data.return_url));
        }

        Ok((jar, found(&redirect)).into_response())
    }

    async fn handle_qq_login_url(
        State(resources): State<Arc<ServerResources>>,
        Query(query): Query<QqLoginUrlQuery>,
    ) -> AppResult<ApiResponse<serde_json::Value>> {
        let Some(qq) = &resources.qq else {
            return Err(AppError::from_code(ErrorCode::QqLoginDisabled));
        };
        if query.app_id.trim().is_empty() {
            return Err(AppError::bad_request("缺少app_id"));
        }

        let url = qq.authorize_url(&query.app_id, query.state.as_deref().unwrap_or_default());
        Ok(ApiResponse::success(json!({ "url": url })))
    }

    async fn handle_send_email_code(
        State(resources): State<Arc<ServerResources>>,
        Json(req): Json<SendEmailCodeRequest>,
    ) -> AppResult<ApiResponse<()>> {
        if req.email.is_empty() {
            return Err(AppError::bad_request("参数错误: 邮箱不能为空"));
        }
        if !resources.captcha.verify(&req.captcha_id, &req.captcha).await? {
            return Err(AppError::from_code(ErrorCode::CaptchaInvalid));
        }

        resources
            .auth_service()
            .send_email_verification_code(&req.email)
            .await?;

        Ok(ApiResponse::success_msg("验证码已发送", None))
    }

    async fn handle_forgot_password(
        State(resources): State<Arc<ServerResources>>,
        Json(req): Json<ForgotPasswordRequest>,
    ) -> AppResult<ApiResponse<()>> {
        if req.email.is_empty() || req.verification_code.is_empty() {
            return Err(AppError::bad_request("参数错误: 邮箱和验证码不能为空"));
        }
        check_password_shape(&req.new_password)?;

        resources
            .auth_service()
            .forgot_password(&req.email, &req.verification_code, &req.new_password)
            .await?;

        Ok(ApiResponse::success_msg("密码重置成功", None))
    }
}

/// Passwords are 8–20 characters
fn check_password_shape(password: &str) -> AppResult<()> {
    let len = password.chars().count();
    if (8..=20).contains(&len) {
        Ok(())
    } else {
        Err(AppError::bad_request("密码长度必须为8-20位"))
    }
}

/// Device id as bound into a just-minted access token; falls back to empty on
/// the (unreachable) parse failure
fn device_id_from_access_token(resources: &ServerResources, access_token: &str) -> String {
    resources
        .codec
        .parse_ignoring_expiry(crate::auth::TokenKind::Access, access_token)
        .map(|claims| claims.device_id)
        .unwrap_or_default()
}
