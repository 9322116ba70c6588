// ABOUTME: Core data models for users, applications, devices, grants, bindings and logs
// ABOUTME: Also carries the shared response bodies and transient KV-backed records
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Common data structures shared by the persistence layer, services and routes.
//!
//! Relational entities mirror the schema created by the `database` module;
//! transient records ([`AuthorizationCode`], [`SessionData`]) are serialized to
//! JSON and live in the KV store under TTL-bound keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account status of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i64)]
pub enum UserStatus {
    /// Account usable
    Active = 1,
    /// Disabled by an administrator
    Disabled = 2,
    /// Deactivated by its owner
    Deactivated = 3,
}

impl UserStatus {
    /// Parse from the stored integer, defaulting unknown values to `Disabled`
    #[must_use]
    pub const fn from_i64(value: i64) -> Self {
        match value {
            1 => Self::Active,
            3 => Self::Deactivated,
            _ => Self::Disabled,
        }
    }
}

/// Where an account came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i64)]
pub enum RegisterSource {
    /// Email + password registration
    Email = 0,
    /// QQ federated login
    Qq = 1,
    /// WeChat federated login
    Wechat = 2,
    /// GitHub federated login
    Github = 3,
}

impl RegisterSource {
    /// Parse from the stored integer, defaulting unknown values to `Email`
    #[must_use]
    pub const fn from_i64(value: i64) -> Self {
        match value {
            1 => Self::Qq,
            2 => Self::Wechat,
            3 => Self::Github,
            _ => Self::Email,
        }
    }

    /// Provider tag for federated sources, `None` for email accounts
    #[must_use]
    pub const fn provider_tag(self) -> Option<&'static str> {
        match self {
            Self::Email => None,
            Self::Qq => Some("qq"),
            Self::Wechat => Some("wechat"),
            Self::Github => Some("github"),
        }
    }
}

/// A registered account. The immutable `uuid` is the cross-system identity;
/// the integer `id` never leaves the database layer.
#[derive(Debug, Clone)]
pub struct User {
    /// Internal handle, strictly a foreign-key artifact
    pub id: i64,
    /// Cross-system identity (v4)
    pub uuid: Uuid,
    /// Display/login name, defaults to the email at registration
    pub username: String,
    /// bcrypt hash; `None` for federated accounts without a password
    pub password_hash: Option<String>,
    /// Unique email, absent on federated accounts
    pub email: Option<String>,
    /// Unique phone number, optional
    pub phone: Option<String>,
    /// Public nickname
    pub nickname: String,
    /// Avatar URL
    pub avatar: String,
    /// Free-form address line
    pub address: String,
    /// Profile signature line
    pub signature: String,
    /// Account status
    pub status: UserStatus,
    /// Registration origin
    pub register_source: RegisterSource,
    /// Super-admin flag for the manage surface
    pub is_super_admin: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Whether the account may authenticate
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

/// A relying application registered with the SSO
#[derive(Debug, Clone)]
pub struct Application {
    /// Internal handle, referenced by foreign keys
    pub id: i64,
    /// Stable external identifier; the only name that appears inside tokens
    pub app_key: String,
    /// Display name
    pub app_name: String,
    /// Confidential secret presented as `client_secret`
    pub app_secret: String,
    /// Comma-separated absolute redirect URL whitelist
    pub redirect_uris: String,
    /// Per-(user, app) online device quota
    pub max_devices: i64,
    /// Comma-separated CORS origins for this app
    pub allowed_origins: String,
    /// 1 = enabled, 0 = disabled
    pub status: i64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Application {
    /// Parsed redirect whitelist, whitespace trimmed, empties dropped
    #[must_use]
    pub fn redirect_uri_list(&self) -> Vec<String> {
        self.redirect_uris
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned)
            .collect()
    }
}

/// Grant status of a (user, app) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum GrantStatus {
    /// User may log into the app
    Allowed = 1,
    /// User is blocked from the app
    Denied = 2,
}

/// Lazily-created user ↔ application relation
#[derive(Debug, Clone)]
pub struct UserAppGrant {
    /// Internal handle
    pub id: i64,
    /// Owning user
    pub user_uuid: Uuid,
    /// Application internal id
    pub app_id: i64,
    /// 1 = allowed, 2 = denied
    pub status: i64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl UserAppGrant {
    /// Whether the grant permits login
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        self.status == GrantStatus::Allowed as i64
    }
}

/// Online state of a device row
pub mod device_status {
    /// Device may hold tokens
    pub const ONLINE: i64 = 1;
    /// Device logged out, kicked or expired
    pub const OFFLINE: i64 = 0;
}

/// A device registered for a (user, app) pair. `device_id` is minted by the
/// client on first use and stable across the installation's lifetime.
#[derive(Debug, Clone)]
pub struct Device {
    /// Internal handle; also the LRU tie-breaker
    pub id: i64,
    /// Owning user
    pub user_uuid: Uuid,
    /// Application internal id
    pub app_id: i64,
    /// Client-minted stable identifier
    pub device_id: String,
    /// Human-readable name ("macOS - Chrome")
    pub device_name: String,
    /// web / ios / android / ...
    pub device_type: String,
    /// Last seen IP
    pub ip_address: String,
    /// Last seen User-Agent
    pub user_agent: String,
    /// Sliding-expiry anchor, touched on every silent login
    pub last_active_at: DateTime<Utc>,
    /// 1 = online, 0 = offline
    pub status: i64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Device {
    /// Whether the device currently holds a session
    #[must_use]
    pub const fn is_online(&self) -> bool {
        self.status == device_status::ONLINE
    }
}

/// External identity bound to a local account, unique on (provider, `open_id`)
#[derive(Debug, Clone)]
pub struct OAuthBinding {
    /// Internal handle
    pub id: i64,
    /// Linked local user
    pub user_uuid: Uuid,
    /// Provider tag (qq / wechat / github)
    pub provider: String,
    /// Provider-scoped identity
    pub open_id: String,
    /// Cross-app identity where the provider supplies one
    pub union_id: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Audit actions recorded in the login log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginAction {
    /// Interactive login
    Login,
    /// Per-app logout
    Logout,
    /// Generic kick
    Kick,
    /// Global SSO logout
    SsoLogout,
    /// Silent login through an existing session
    SilentLogin,
    /// Quota eviction
    AutoKick,
    /// Sliding-expiry eviction
    Expired,
    /// User-initiated kick from the manage surface
    ManualKick,
    /// Federated QQ login
    QqLogin,
    /// Logout-all sweep
    LogoutAll,
}

impl LoginAction {
    /// Stable string stored in the log table
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Logout => "logout",
            Self::Kick => "kick",
            Self::SsoLogout => "sso_logout",
            Self::SilentLogin => "silent_login",
            Self::AutoKick => "auto_kick",
            Self::Expired => "expired",
            Self::ManualKick => "manual_kick",
            Self::QqLogin => "qq_login",
            Self::LogoutAll => "logout_all",
        }
    }
}

/// Append-only audit record; never mutated after insert
#[derive(Debug, Clone)]
pub struct LoginLog {
    /// Internal handle
    pub id: i64,
    /// Acting user
    pub user_uuid: Uuid,
    /// Application internal id
    pub app_id: i64,
    /// Action tag (see [`LoginAction`])
    pub action: String,
    /// Device the action applied to
    pub device_id: String,
    /// Caller IP where known
    pub ip_address: String,
    /// Caller User-Agent where known
    pub user_agent: String,
    /// 1 = success, 0 = failure
    pub status: i64,
    /// Human-readable detail
    pub message: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Authorization code payload stored under `auth_code:{code}` (JSON, TTL 5 min)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    /// The code itself, 32 random bytes hex-encoded
    pub code: String,
    /// Subject user
    pub user_uuid: String,
    /// `app_key` the code was issued for
    pub app_id: String,
    /// Redirect target bound at issuance
    pub redirect_uri: String,
    /// Pre-minted access token released on consumption
    pub access_token: String,
    /// Pre-minted refresh token released on consumption
    pub refresh_token: String,
    /// Expiry instant, informational next to the KV TTL
    pub expires_at: DateTime<Utc>,
}

/// Server-side SSO session stored under `sso_session:{id}` (JSON, TTL 7 days)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    /// Logged-in user
    pub user_uuid: String,
    /// Device id the browser presented at login
    pub sso_device_id: String,
    /// User-Agent at login time, compared on silent login
    pub user_agent: String,
    /// IP at login time, compared on silent login
    pub ip_address: String,
    /// Login flag; sessions without it fall back to the login page
    pub logged_in: bool,
    /// Unix seconds of the login
    pub logged_in_at: i64,
}

/// Public profile shape returned by login, user and internal endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    /// Cross-system identity
    pub uuid: String,
    /// Public nickname
    pub nickname: String,
    /// Avatar URL
    pub avatar: String,
    /// Email, empty for federated accounts without one
    pub email: String,
    /// Address line
    pub address: String,
    /// Signature line
    pub signature: String,
    /// 0: email, 1: qq, 2: wechat, 3: github
    pub register_source: i64,
}

impl From<&User> for UserInfo {
    fn from(user: &User) -> Self {
        Self {
            uuid: user.uuid.to_string(),
            nickname: user.nickname.clone(),
            avatar: user.avatar.clone(),
            email: user.email.clone().unwrap_or_default(),
            address: user.address.clone(),
            signature: user.signature.clone(),
            register_source: user.register_source as i64,
        }
    }
}

/// Token pair handed to relying applications
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// RS256 access token
    pub access_token: String,
    /// RS256 refresh token
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub refresh_token: String,
    /// Always "Bearer"
    pub token_type: String,
    /// Access-token lifetime in seconds
    pub expires_in: i64,
    /// Profile of the authenticated user, present on interactive logins
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_info: Option<UserInfo>,
}

/// Device row shape for the manage surface
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    /// Internal row id
    pub id: i64,
    /// Client-minted identifier
    pub device_id: String,
    /// Human-readable name
    pub device_name: String,
    /// web / ios / android / ...
    pub device_type: String,
    /// Last seen IP
    pub ip_address: String,
    /// Sliding-expiry anchor
    pub last_active_at: DateTime<Utc>,
    /// 1 = online, 0 = offline
    pub status: i64,
    /// Whether this row is the caller's own device
    pub is_current: bool,
    /// Registration time
    pub created_at: DateTime<Utc>,
    /// Display name of the owning application
    pub app_name: String,
    /// `app_key` of the owning application
    pub app_key: String,
}

/// Login-log row shape for the manage surface
#[derive(Debug, Clone, Serialize)]
pub struct LogInfo {
    /// Internal row id
    pub id: i64,
    /// Action tag
    pub action: String,
    /// Device the action applied to
    pub device_id: String,
    /// Caller IP where known
    pub ip_address: String,
    /// 1 = success, 0 = failure
    pub status: i64,
    /// Human-readable detail
    pub message: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Paged listing envelope
#[derive(Debug, Clone, Serialize)]
pub struct PageResponse<T: Serialize> {
    /// Page of rows
    pub list: Vec<T>,
    /// Total rows matching the filter
    pub total: i64,
    /// 1-based page index
    pub page: i64,
    /// Rows per page
    pub page_size: i64,
}

/// Public directory entry for `GET /oauth/applications`
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationInfo {
    /// Stable external identifier
    pub app_id: String,
    /// Display name
    pub app_name: String,
    /// Per-(user, app) online device quota
    pub max_devices: i64,
    /// 1 = enabled
    pub status: i64,
    /// Registration time
    pub created_at: DateTime<Utc>,
}

impl From<&Application> for ApplicationInfo {
    fn from(app: &Application) -> Self {
        Self {
            app_id: app.app_key.clone(),
            app_name: app.app_name.clone(),
            max_devices: app.max_devices,
            status: app.status,
            created_at: app.created_at,
        }
    }
}
