// ABOUTME: QQ identity provider over the graph.qq.com OAuth API
// ABOUTME: Code exchange with need_openid=1 returns the openid inline; profile via get_user_info
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use super::{ExternalIdentity, ExternalProfile, IdentityProvider};
use crate::config::environment::QqConfig;
use crate::errors::{AppError, AppResult, ErrorCode};
use serde::Deserialize;

const TOKEN_URL: &str = "https://graph.qq.com/oauth2.0/token";
const USER_INFO_URL: &str = "https://graph.qq.com/user/get_user_info";
const AUTHORIZE_URL: &str = "https://graph.qq.com/oauth2.0/authorize";

/// QQ graph API client
pub struct QqProvider {
    http: reqwest::Client,
    config: QqConfig,
}

#[derive(Debug, Deserialize)]
struct QqTokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    openid: String,
    #[serde(default)]
    unionid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QqUserInfoResponse {
    #[serde(default)]
    ret: i64,
    #[serde(default)]
    nickname: String,
    #[serde(default)]
    figureurl_qq_2: String,
}

impl QqProvider {
    /// Create a provider sharing the process-wide HTTP client
    #[must_use]
    pub fn new(http: reqwest::Client, config: QqConfig) -> Self {
        Self { http, config }
    }

    /// Authorize URL the browser is sent to. The SSO's callback gets
    /// `?app_id=` appended so the returning request still knows its audience;
    /// `state` rides through the provider untouched.
    #[must_use]
    pub fn authorize_url(&self, app_key: &str, state: &str) -> String {
        let callback = format!(
            "{}?app_id={}",
            self.config.redirect_uri,
            urlencoding::encode(app_key)
        );
        let mut url = format!(
            "{AUTHORIZE_URL}?response_type=code&client_id={}&redirect_uri={}",
            self.config.app_id,
            urlencoding::encode(&callback)
        );
        if !state.is_empty() {
            url.push_str("&state=");
            url.push_str(&urlencoding::encode(state));
        }
        url
    }
}

#[async_trait::async_trait]
impl IdentityProvider for QqProvider {
    fn tag(&self) -> &'static str {
        "qq"
    }

    async fn exchange_code(&self, code: &str) -> AppResult<ExternalIdentity> {
        let response = self
            .http
            .get(TOKEN_URL)
            .query(&[
                ("grant_type", "authorization_code"),
                ("client_id", self.config.app_id.as_str()),
                ("client_secret", self.config.app_key.as_str()),
                ("code", code),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("fmt", "json"),
                ("need_openid", "1"),
            ])
            .send()
            .await
            .map_err(|e| external_error(format!("QQ token exchange failed: {e}")))?;

        if !response.status().is_success() {
            return Err(external_error(format!(
                "QQ token exchange answered {}",
                response.status()
            )));
        }

        let token: QqTokenResponse = response
            .json()
            .await
            .map_err(|e| external_error(format!("QQ token response unreadable: {e}")))?;

        if token.access_token.is_empty() || token.openid.is_empty() {
            return Err(AppError::new(ErrorCode::ExternalServiceError, "获取QQ授权失败"));
        }

        Ok(ExternalIdentity {
            open_id: token.openid,
            union_id: token.unionid,
            access_token: token.access_token,
        })
    }

    async fn fetch_profile(&self, identity: &ExternalIdentity) -> AppResult<ExternalProfile> {
        let response = self
            .http
            .get(USER_INFO_URL)
            .query(&[
                ("access_token", identity.access_token.as_str()),
                ("oauth_consumer_key", self.config.app_id.as_str()),
                ("openid", identity.open_id.as_str()),
            ])
            .send()
            .await
            .map_err(|e| external_error(format!("QQ profile fetch failed: {e}")))?;

        if !response.status().is_success() {
            return Err(external_error(format!(
                "QQ profile fetch answered {}",
                response.status()
            )));
        }

        let info: QqUserInfoResponse = response
            .json()
            .await
            .map_err(|e| external_error(format!("QQ profile response unreadable: {e}")))?;

        if info.ret != 0 {
            // Non-fatal: the account still logs in with a default profile
            tracing::warn!("QQ get_user_info answered ret={}", info.ret);
            return Ok(ExternalProfile::default());
        }

        Ok(ExternalProfile {
            nickname: info.nickname,
            avatar: info.figureurl_qq_2,
        })
    }
}

fn external_error(detail: String) -> AppError {
    tracing::warn!("{detail}");
    AppError::from_code(ErrorCode::ExternalServiceError)
}
