// ABOUTME: Canonical KV key builders and TTLs for every transient record
// ABOUTME: One place defines the wire-visible key layout of the store
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Key layout of the KV store. Keys are part of the deployment contract
//! (operators inspect and purge them), so every format lives here.

use std::time::Duration;
use uuid::Uuid;

/// TTL of authorization codes, verification codes, nonces and captchas
pub const SHORT_TTL: Duration = Duration::from_secs(5 * 60);

/// TTL of device-blacklist entries written by kicks
pub const DEVICE_BLACKLIST_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

/// TTL of SSO sessions (non-sliding; a re-login refreshes)
pub const SESSION_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

/// Revocation handle for the refresh token of a (user, device) pair
#[must_use]
pub fn refresh_token(user_uuid: Uuid, device_id: &str) -> String {
    format!("refresh_token:{user_uuid}:{device_id}")
}

/// Logged-out access tokens, keyed by the raw token string
#[must_use]
pub fn token_blacklist(access_token: &str) -> String {
    format!("token:blacklist:{access_token}")
}

/// Kicked or revoked devices
#[must_use]
pub fn device_blacklist(device_id: &str) -> String {
    format!("device:blacklist:{device_id}")
}

/// Single-use authorization codes
#[must_use]
pub fn auth_code(code: &str) -> String {
    format!("auth_code:{code}")
}

/// Email verification codes
#[must_use]
pub fn email_verification_code(email: &str) -> String {
    format!("email_verification_code:{email}")
}

/// Consumed state nonces
#[must_use]
pub fn oauth_nonce(nonce: &str) -> String {
    format!("oauth_nonce:{nonce}")
}

/// Server-side SSO sessions, keyed by the opaque cookie value
#[must_use]
pub fn sso_session(session_id: &str) -> String {
    format!("sso_session:{session_id}")
}

/// Image-captcha answers
#[must_use]
pub fn captcha(captcha_id: &str) -> String {
    format!("captcha:{captcha_id}")
}
