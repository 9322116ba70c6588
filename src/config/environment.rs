// ABOUTME: Environment configuration management for deployment-specific settings
// ABOUTME: Typed sub-configs for database, redis, jwt, session, qq, email, captcha, cors
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Environment-based configuration. Everything is resolved once by
//! [`ServerConfig::from_env`] at startup; no config files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Deployment environment controlling cookie scoping and log formats
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development: host-scoped, insecure session cookie
    #[default]
    Development,
    /// Production: domain-suffix scoped, Secure session cookie
    Production,
    /// Test runs
    Testing,
}

impl Environment {
    /// Parse from string with fallback to development
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "testing" | "test" => Self::Testing,
            _ => Self::Development,
        }
    }

    /// Whether this is a production deployment
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
            Self::Testing => write!(f, "testing"),
        }
    }
}

/// Relational database settings
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// sqlx connection URL (`sqlite:sso.db`, `sqlite::memory:`)
    pub url: String,
    /// Pool size
    pub max_connections: u32,
}

/// JWT signing settings
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// PEM file holding the RSA private key (SSO only)
    pub private_key_path: PathBuf,
    /// PEM file holding the RSA public key (distributed to relying apps)
    pub public_key_path: PathBuf,
    /// Access-token lifetime in seconds
    pub access_token_expiry_secs: i64,
    /// Refresh-token lifetime in seconds
    pub refresh_token_expiry_secs: i64,
    /// Issuer claim value
    pub issuer: String,
}

/// Session cookie scoping
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Cookie domain (`.example.com` enables cross-subdomain SSO); empty for
    /// host-scoped cookies
    pub cookie_domain: String,
    /// Whether the cookie carries the Secure attribute
    pub cookie_secure: bool,
    /// Force re-authentication when the session UA/IP differ from the request
    pub strict_binding: bool,
}

/// QQ federation settings
#[derive(Debug, Clone)]
pub struct QqConfig {
    /// Whether QQ login is offered at all
    pub enable: bool,
    /// QQ application id (`client_id` at graph.qq.com)
    pub app_id: String,
    /// QQ application key (`client_secret` at graph.qq.com)
    pub app_key: String,
    /// Callback URL registered with QQ; the SSO appends `?app_id=`
    pub redirect_uri: String,
}

/// SMTP settings for verification-code mail
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// Whether outbound mail is enabled; disabled deployments only log
    pub enable: bool,
    /// SMTP relay host
    pub host: String,
    /// SMTP relay port
    pub port: u16,
    /// From address
    pub from: String,
    /// Display name on outgoing mail
    pub nickname: String,
    /// SMTP credential
    pub secret: String,
}

/// Digit-captcha rendering settings
#[derive(Debug, Clone)]
pub struct CaptchaConfig {
    /// Image height in px
    pub height: u32,
    /// Image width in px
    pub width: u32,
    /// Number of digits
    pub length: usize,
}

/// Top-level server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listen port
    pub http_port: u16,
    /// Deployment environment
    pub environment: Environment,
    /// Route prefix every endpoint lives under (default `/api`)
    pub router_prefix: String,
    /// Login page the authorize endpoint redirects to
    pub login_url: String,
    /// Allowed CORS origins, comma separated; empty allows none
    pub allowed_origins: Vec<String>,
    /// Default avatar assigned at registration
    pub default_avatar: String,
    /// Relational database
    pub database: DatabaseConfig,
    /// Redis URL for the KV store; unset selects the in-memory backend
    pub redis_url: Option<String>,
    /// Token signing
    pub jwt: JwtConfig,
    /// Session cookie scoping
    pub session: SessionConfig,
    /// QQ federation
    pub qq: QqConfig,
    /// Verification-code mail
    pub email: EmailConfig,
    /// Captcha rendering
    pub captcha: CaptchaConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable fails to parse.
    pub fn from_env() -> Result<Self> {
        let environment =
            Environment::from_str_or_default(&env_var_or("SSO_ENVIRONMENT", "development"));

        Ok(Self {
            http_port: parse_env("HTTP_PORT", 8080)?,
            environment,
            router_prefix: env_var_or("SSO_ROUTER_PREFIX", "/api"),
            login_url: env_var_or("SSO_LOGIN_URL", "/login"),
            allowed_origins: split_csv(&env_var_or("SSO_ALLOWED_ORIGINS", "")),
            default_avatar: env_var_or("SSO_DEFAULT_AVATAR", "/static/default-avatar.png"),
            database: DatabaseConfig {
                url: env_var_or("DATABASE_URL", "sqlite:data/sso.db"),
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 16)?,
            },
            redis_url: env::var("REDIS_URL").ok(),
            jwt: JwtConfig {
                private_key_path: PathBuf::from(env_var_or(
                    "JWT_PRIVATE_KEY_PATH",
                    "keys/private.pem",
                )),
                public_key_path: PathBuf::from(env_var_or(
                    "JWT_PUBLIC_KEY_PATH",
                    "keys/public.pem",
                )),
                access_token_expiry_secs: parse_env("JWT_ACCESS_TOKEN_EXPIRY_SECS", 7_200)?,
                refresh_token_expiry_secs: parse_env("JWT_REFRESH_TOKEN_EXPIRY_SECS", 604_800)?,
                issuer: env_var_or("JWT_ISSUER", "sso-auth-server"),
            },
            session: SessionConfig {
                cookie_domain: env_var_or("SESSION_COOKIE_DOMAIN", ""),
                cookie_secure: environment.is_production(),
                strict_binding: parse_bool("SESSION_STRICT_BINDING", false),
            },
            qq: QqConfig {
                enable: parse_bool("QQ_LOGIN_ENABLE", false),
                app_id: env_var_or("QQ_APP_ID", ""),
                app_key: env_var_or("QQ_APP_KEY", ""),
                redirect_uri: env_var_or("QQ_REDIRECT_URI", ""),
            },
            email: EmailConfig {
                enable: parse_bool("EMAIL_ENABLE", false),
                host: env_var_or("EMAIL_HOST", ""),
                port: parse_env("EMAIL_PORT", 465)?,
                from: env_var_or("EMAIL_FROM", ""),
                nickname: env_var_or("EMAIL_NICKNAME", "SSO"),
                secret: env_var_or("EMAIL_SECRET", ""),
            },
            captcha: CaptchaConfig {
                height: parse_env("CAPTCHA_HEIGHT", 20)?,
                width: parse_env("CAPTCHA_WIDTH", 80)?,
                length: parse_env("CAPTCHA_LENGTH", 4)?,
            },
        })
    }

    /// One-line startup summary, safe to log (no secrets)
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "env={} port={} prefix={} db={} kv={} qq_login={} mail={}",
            self.environment,
            self.http_port,
            self.router_prefix,
            self.database.url,
            self.redis_url.as_deref().unwrap_or("memory"),
            self.qq.enable,
            self.email.enable,
        )
    }
}

fn env_var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("invalid value for {key}: {raw}")),
        Err(_) => Ok(default),
    }
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}
