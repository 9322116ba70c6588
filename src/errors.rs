// ABOUTME: Centralized error handling and error codes for the SSO authorization server
// ABOUTME: Maps domain errors onto the {code, msg, data} response envelope
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Unified Error Handling System
//!
//! Every endpoint answers with the `{code, msg, data}` envelope where `code = 0`
//! means success and non-zero codes are domain specific. Error kinds are modeled
//! as [`ErrorCode`] variants carrying their numeric domain code and HTTP status;
//! [`AppError`] adds the user-facing message. User-facing messages are Chinese
//! (the product contract); log lines stay English.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Domain error codes surfaced to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Malformed request body or missing parameters
    BadRequest,
    /// Missing or unparsable credentials on a protected route
    Unauthorized,

    // Credential / account state
    /// Unknown email or wrong password (uniform on purpose)
    InvalidCredentials,
    /// Account disabled by an administrator
    AccountDisabled,
    /// Account deactivated by its owner
    AccountDeactivated,
    /// Missing or mismatched verification code (uniform to avoid an oracle)
    VerificationCodeInvalid,
    /// Image captcha missing, wrong or expired
    CaptchaInvalid,
    /// Registration rejected (duplicate email etc.)
    RegisterFailed,

    // Application / grant
    /// Unknown `app_key` or application not enabled
    AppNotFound,
    /// UserAppGrant denied for this (user, app) pair
    AppAccessDenied,

    // OAuth plumbing
    /// Authorization code unknown, expired or already consumed
    AuthCodeInvalid,
    /// Authorization code presented with a different app or redirect target
    RedirectUriMismatch,
    /// Unknown `client_id` or wrong `client_secret`
    ClientCredentialsInvalid,
    /// Refresh token rejected (expired, malformed or rotated away)
    RefreshInvalid,
    /// State envelope failed verification
    StateInvalid,

    // Access tokens
    /// Access token past its expiry (eligible for refresh)
    TokenExpired,
    /// Access token cryptographically invalid or malformed
    TokenInvalid,
    /// Access token blacklisted by logout
    TokenRevoked,

    // Devices
    /// Device blacklisted or offline
    DeviceRevoked,
    /// Sliding-expiry window exceeded
    DeviceExpired,
    /// Device row missing or offline
    DeviceNotFound,
    /// Quota policy rejected the login (eviction itself failed)
    DeviceQuotaExceeded,
    /// Caller tried to kick the device it is calling from
    KickCurrentDevice,

    // Session
    /// SSO session missing fields or corrupt
    SessionInvalid,

    /// Unknown user uuid
    UserNotFound,

    // Federation
    /// External identity provider rejected or misbehaved
    ExternalServiceError,
    /// QQ login disabled by configuration
    QqLoginDisabled,

    // Internal
    /// Unexpected internal failure
    InternalError,
    /// Database operation failed
    DatabaseError,
    /// Configuration is missing or invalid
    ConfigError,
    /// Captcha image generation failed
    CaptchaGeneration,
}

impl ErrorCode {
    /// Numeric domain code carried in the response envelope
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::BadRequest => 400,
            Self::Unauthorized => 401,
            Self::CaptchaInvalid => 1000,
            Self::RegisterFailed => 1001,
            Self::InvalidCredentials => 1002,
            Self::AuthCodeInvalid => 1003,
            Self::UserNotFound => 1005,
            Self::VerificationCodeInvalid => 1010,
            Self::QqLoginDisabled => 1012,
            Self::StateInvalid => 1013,
            Self::SessionInvalid => 1014,
            Self::AccountDisabled => 1021,
            Self::AccountDeactivated => 1022,
            Self::AppNotFound => 1030,
            Self::AppAccessDenied => 1031,
            Self::RedirectUriMismatch => 1033,
            Self::ClientCredentialsInvalid => 1040,
            Self::RefreshInvalid => 1041,
            Self::TokenExpired => 1042,
            Self::TokenInvalid => 1043,
            Self::TokenRevoked => 1044,
            Self::DeviceRevoked => 2001,
            Self::KickCurrentDevice => 2002,
            Self::DeviceExpired => 2003,
            Self::DeviceNotFound => 2005,
            Self::DeviceQuotaExceeded => 2006,
            Self::ExternalServiceError => 3001,
            Self::InternalError | Self::DatabaseError | Self::ConfigError => 5000,
            Self::CaptchaGeneration => 5001,
        }
    }

    /// HTTP status the envelope rides on
    #[must_use]
    pub const fn http_status(self) -> StatusCode {
        match self {
            Self::BadRequest
            | Self::CaptchaInvalid
            | Self::RegisterFailed
            | Self::VerificationCodeInvalid
            | Self::AuthCodeInvalid
            | Self::RedirectUriMismatch
            | Self::StateInvalid
            | Self::KickCurrentDevice => StatusCode::BAD_REQUEST,

            Self::Unauthorized
            | Self::InvalidCredentials
            | Self::ClientCredentialsInvalid
            | Self::RefreshInvalid
            | Self::TokenExpired
            | Self::TokenInvalid
            | Self::TokenRevoked
            | Self::DeviceRevoked
            | Self::DeviceExpired
            | Self::SessionInvalid => StatusCode::UNAUTHORIZED,

            Self::AccountDisabled
            | Self::AccountDeactivated
            | Self::AppAccessDenied
            | Self::DeviceQuotaExceeded
            | Self::QqLoginDisabled => StatusCode::FORBIDDEN,

            Self::AppNotFound | Self::DeviceNotFound | Self::UserNotFound => StatusCode::NOT_FOUND,

            Self::ExternalServiceError => StatusCode::BAD_GATEWAY,

            Self::InternalError
            | Self::DatabaseError
            | Self::ConfigError
            | Self::CaptchaGeneration => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Default user-facing message for this error kind
    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::BadRequest => "参数错误",
            Self::Unauthorized => "未提供认证token",
            Self::CaptchaInvalid => "验证码错误",
            Self::RegisterFailed => "注册失败",
            Self::InvalidCredentials => "邮箱或密码错误",
            Self::AuthCodeInvalid => "授权码无效或已过期",
            Self::VerificationCodeInvalid => "验证码错误或已过期",
            Self::QqLoginDisabled => "QQ登录未启用",
            Self::StateInvalid => "state验证失败",
            Self::SessionInvalid => "Session 数据格式错误",
            Self::AccountDisabled => "账号已被禁用，请联系管理员",
            Self::AccountDeactivated => "账号已注销",
            Self::AppNotFound => "应用不存在或未启用",
            Self::UserNotFound => "用户不存在",
            Self::AppAccessDenied => "您无权访问此应用",
            Self::RedirectUriMismatch => "回调地址不匹配",
            Self::ClientCredentialsInvalid => "client_id或client_secret错误",
            Self::RefreshInvalid => "refresh_token无效",
            Self::TokenExpired => "token已过期",
            Self::TokenInvalid => "token无效",
            Self::TokenRevoked => "token已失效",
            Self::DeviceRevoked => "设备已被移除",
            Self::KickCurrentDevice => "不能踢出当前设备",
            Self::DeviceExpired => "设备已过期，请重新登录",
            Self::DeviceNotFound => "设备不存在或已离线",
            Self::DeviceQuotaExceeded => "设备数量已达上限",
            Self::ExternalServiceError => "第三方服务异常，请稍后再试",
            Self::InternalError | Self::DatabaseError | Self::ConfigError => {
                "系统繁忙，请稍后再试"
            }
            Self::CaptchaGeneration => "生成验证码失败",
        }
    }

    /// Whether a 4xx occurrence of this kind is security relevant and logged at `warn`
    #[must_use]
    pub const fn is_security_event(self) -> bool {
        matches!(
            self,
            Self::StateInvalid
                | Self::DeviceRevoked
                | Self::ClientCredentialsInvalid
                | Self::TokenRevoked
                | Self::RefreshInvalid
        )
    }
}

/// Application error carried through handlers and services
#[derive(Debug, Clone, Error)]
#[error("{}: {}", .code.code(), .message)]
pub struct AppError {
    /// Error kind with numeric code and HTTP status
    pub code: ErrorCode,
    /// User-facing message
    pub message: String,
}

impl AppError {
    /// Create a new error with an explicit message
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Create an error carrying the kind's default message
    #[must_use]
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    /// Malformed request parameters
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    /// Missing or unusable credentials
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    /// Internal failure; the message is logged, never sent to the client
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Database failure; the message is logged, never sent to the client
    #[must_use]
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// Configuration failure
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }

    /// Message safe to return to the client. Internal kinds collapse to a
    /// generic message so DB/serialization details never leak.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self.code {
            ErrorCode::InternalError
            | ErrorCode::DatabaseError
            | ErrorCode::ConfigError
            | ErrorCode::CaptchaGeneration => self.code.default_message().to_owned(),
            _ => self.message.clone(),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> Self {
        Self::database(error.to_string())
    }
}

impl From<redis::RedisError> for AppError {
    fn from(error: redis::RedisError) -> Self {
        Self::internal(format!("redis error: {error}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::internal(format!("serialization error: {error}"))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::internal(error.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.code.http_status();
        if status.is_server_error() {
            tracing::error!(code = self.code.code(), "request failed: {}", self.message);
        } else if self.code.is_security_event() {
            tracing::warn!(code = self.code.code(), "security event: {}", self.message);
        }

        let body = ApiResponse::<()> {
            code: self.code.code(),
            msg: self.client_message(),
            data: None,
        };
        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers and services
pub type AppResult<T> = Result<T, AppError>;

/// The `{code, msg, data}` response envelope
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    /// 0 on success, domain code otherwise
    pub code: u32,
    /// Human-readable message
    pub msg: String,
    /// Payload, omitted when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    /// Successful response with payload
    #[must_use]
    pub fn success(data: T) -> Self {
        Self {
            code: 0,
            msg: "success".to_owned(),
            data: Some(data),
        }
    }

    /// Successful response with an explicit message
    #[must_use]
    pub fn success_msg(msg: impl Into<String>, data: Option<T>) -> Self {
        Self {
            code: 0,
            msg: msg.into(),
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}
