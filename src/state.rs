// ABOUTME: State envelope protecting the redirect hop against replay and open redirects
// ABOUTME: base64(JSON) payload with nonce consumption and redirect-uri whitelisting
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # State Envelope
//!
//! The `state` parameter carried through the user-agent redirect hop is a
//! base64-encoded JSON object binding a login attempt to its originating
//! authorize request. It is not signed; the nonce (single-use within 5
//! minutes, enforced through the KV store) plus the expiry stamp make replays
//! fail, and the redirect whitelist check stops open redirects.
//!
//! Whitelist matching compares `scheme://host/path` only: query strings are
//! ignored, nothing is suffix- or wildcard-matched.

use crate::cache::{keys, Kv};
use crate::database::Database;
use crate::errors::{AppError, AppResult, ErrorCode};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Lifetime of a state envelope in seconds
pub const STATE_TTL_SECS: i64 = 300;

/// Payload of the `state` parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateData {
    /// Single-use random value
    pub nonce: String,
    /// `app_key` of the requesting application
    pub app_id: String,
    /// Client-minted device id echoed back through the hop
    #[serde(default)]
    pub device_id: String,
    /// Whitelisted callback the code will be delivered to
    pub redirect_uri: String,
    /// Page the relying app returns the user to afterwards
    #[serde(default)]
    pub return_url: String,
    /// Issued-at, seconds since epoch
    pub iat: i64,
    /// Expiry, seconds since epoch (`iat + 300`)
    pub exp: i64,
}

/// Why a state envelope was rejected
#[derive(Debug, Clone, Error)]
pub enum StateError {
    /// Not base64, not JSON, or required fields empty
    #[error("state格式错误")]
    Malformed,
    /// `exp` is not in the future
    #[error("state已过期")]
    Expired,
    /// Nonce already consumed within its window
    #[error("state已被使用")]
    Replayed,
    /// `redirect_uri` not in the application's whitelist
    #[error("redirect_uri不在白名单中")]
    WhitelistRejected,
}

impl From<StateError> for AppError {
    fn from(err: StateError) -> Self {
        Self::new(ErrorCode::StateInvalid, format!("state验证失败: {err}"))
    }
}

/// Encode a state payload; sets `iat`/`exp` when unset
///
/// # Errors
///
/// Returns [`StateError::Malformed`] if a required field is empty.
pub fn encode_state(data: &StateData) -> Result<String, StateError> {
    if data.nonce.is_empty() || data.app_id.is_empty() || data.redirect_uri.is_empty() {
        return Err(StateError::Malformed);
    }

    let mut data = data.clone();
    if data.iat == 0 {
        data.iat = Utc::now().timestamp();
    }
    if data.exp == 0 {
        data.exp = data.iat + STATE_TTL_SECS;
    }

    let json = serde_json::to_vec(&data).map_err(|_| StateError::Malformed)?;
    Ok(BASE64.encode(json))
}

/// Decode a state parameter without verifying it
///
/// # Errors
///
/// Returns [`StateError::Malformed`] if the parameter cannot be decoded.
pub fn decode_state(state: &str) -> Result<StateData, StateError> {
    if state.is_empty() {
        return Err(StateError::Malformed);
    }
    let json = BASE64.decode(state).map_err(|_| StateError::Malformed)?;
    serde_json::from_slice(&json).map_err(|_| StateError::Malformed)
}

/// Verifies state envelopes against the nonce store and app whitelists
#[derive(Clone)]
pub struct StateVerifier {
    kv: Kv,
    database: Database,
}

impl StateVerifier {
    /// Create a verifier over the shared stores
    #[must_use]
    pub const fn new(kv: Kv, database: Database) -> Self {
        Self { kv, database }
    }

    /// Full verification: structure, expiry, nonce consumption, whitelist.
    ///
    /// Consuming the nonce marks it used for 5 minutes; a replay inside the
    /// window fails here, a replay after it is stopped by the `exp` check.
    ///
    /// # Errors
    ///
    /// `StateInvalid` with a reason distinguishing expiry, replay, whitelist
    /// rejection and structural errors.
    pub async fn verify(&self, state: &str) -> AppResult<StateData> {
        let data = decode_state(state)?;

        if data.nonce.is_empty() || data.app_id.is_empty() || data.redirect_uri.is_empty() {
            return Err(StateError::Malformed.into());
        }

        // exp == now is already expired
        if data.exp <= Utc::now().timestamp() {
            return Err(StateError::Expired.into());
        }

        self.consume_nonce(&data.nonce).await?;
        self.check_redirect_whitelist(&data.app_id, &data.redirect_uri)
            .await?;

        Ok(data)
    }

    /// Mark a nonce used, SETNX-style: the first caller wins, every later
    /// caller inside the TTL sees a replay.
    async fn consume_nonce(&self, nonce: &str) -> AppResult<()> {
        let written = self
            .kv
            .set_nx(&keys::oauth_nonce(nonce), "used", Some(keys::SHORT_TTL))
            .await?;
        if written {
            Ok(())
        } else {
            Err(StateError::Replayed.into())
        }
    }

    /// Whitelist membership for the requested application
    async fn check_redirect_whitelist(&self, app_key: &str, redirect_uri: &str) -> AppResult<()> {
        let app = self
            .database
            .get_application_by_key(app_key)
            .await?
            .ok_or_else(|| AppError::from_code(ErrorCode::AppNotFound))?;

        let whitelist = app.redirect_uri_list();
        if whitelist.is_empty() {
            return Err(StateError::WhitelistRejected.into());
        }

        let Some(requested) = base_uri(redirect_uri) else {
            return Err(StateError::Malformed.into());
        };

        let allowed = whitelist
            .iter()
            .filter_map(|entry| base_uri(entry))
            .any(|entry| entry == requested);

        if allowed {
            Ok(())
        } else {
            Err(StateError::WhitelistRejected.into())
        }
    }
}

/// `scheme://host[:port]/path` of a URL, dropping query string and fragment
fn base_uri(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    let host = url.host_str()?;
    let mut base = format!("{}://{host}", url.scheme());
    if let Some(port) = url.port() {
        base.push_str(&format!(":{port}"));
    }
    base.push_str(url.path());
    Some(base)
}
