// ABOUTME: Single-use authorization code broker over the KV store
// ABOUTME: 32 random bytes hex-encoded; GETDEL makes consumption at-most-once
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # OAuth Code Broker
//!
//! Codes bind a pre-minted token pair to (user, app, redirect target) for five
//! minutes. Consumption reads with GETDEL: concurrent attempts race on the
//! delete and at most one caller ever observes the value, which is the
//! single-use guarantee.

use crate::cache::{keys, Kv};
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::models::AuthorizationCode;
use chrono::Utc;
use rand::rngs::OsRng;
use rand::RngCore;

/// Issues and consumes authorization codes
#[derive(Clone)]
pub struct CodeBroker {
    kv: Kv,
}

impl CodeBroker {
    /// Create a broker over the shared KV store
    #[must_use]
    pub const fn new(kv: Kv) -> Self {
        Self { kv }
    }

    /// Issue a code for a freshly minted token pair.
    ///
    /// The full record is stored as JSON (it must survive values containing
    /// quotes and slashes) under `auth_code:{code}` with a 5-minute TTL.
    ///
    /// # Errors
    ///
    /// Returns an error if the KV write fails.
    pub async fn issue_code(
        &self,
        user_uuid: &str,
        app_key: &str,
        redirect_uri: &str,
        access_token: &str,
        refresh_token: &str,
    ) -> AppResult<String> {
        let mut raw = [0u8; 32];
        OsRng.fill_bytes(&mut raw);
        let code = hex::encode(raw);

        let record = AuthorizationCode {
            code: code.clone(),
            user_uuid: user_uuid.to_owned(),
            app_id: app_key.to_owned(),
            redirect_uri: redirect_uri.to_owned(),
            access_token: access_token.to_owned(),
            refresh_token: refresh_token.to_owned(),
            expires_at: Utc::now() + chrono::Duration::seconds(keys::SHORT_TTL.as_secs() as i64),
        };

        self.kv
            .set(
                &keys::auth_code(&code),
                &serde_json::to_string(&record)?,
                Some(keys::SHORT_TTL),
            )
            .await?;

        Ok(code)
    }

    /// Consume a code exactly once.
    ///
    /// The GETDEL removes the record before any comparison, so even a
    /// mismatched attempt burns the code.
    ///
    /// # Errors
    ///
    /// `AuthCodeInvalid` on unknown/expired/already-consumed codes,
    /// `AuthCodeInvalid`/`RedirectUriMismatch` on app or redirect mismatch.
    pub async fn consume_code(
        &self,
        code: &str,
        app_key: &str,
        redirect_uri: &str,
    ) -> AppResult<AuthorizationCode> {
        let raw = self
            .kv
            .get_del(&keys::auth_code(code))
            .await?
            .ok_or_else(|| AppError::from_code(ErrorCode::AuthCodeInvalid))?;

        let record: AuthorizationCode = serde_json::from_str(&raw)
            .map_err(|_| AppError::new(ErrorCode::AuthCodeInvalid, "授权码数据格式错误"))?;

        if record.app_id != app_key {
            return Err(AppError::new(ErrorCode::AuthCodeInvalid, "应用ID不匹配"));
        }
        if record.redirect_uri != redirect_uri {
            return Err(AppError::from_code(ErrorCode::RedirectUriMismatch));
        }

        Ok(record)
    }
}
