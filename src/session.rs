// ABOUTME: Browser-scoped SSO session manager: opaque cookie id, server-side KV state
// ABOUTME: Cookie scoping follows the environment; production is suffix-scoped and Secure
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # SSO Session Manager
//!
//! The `sso_session` cookie carries only an opaque id; the session itself
//! ([`SessionData`]) is stored server-side under `sso_session:{id}` with a
//! 7-day non-sliding TTL (a re-login replaces it). The cookie is HttpOnly,
//! SameSite=Lax and path-scoped to `/`; in production it is additionally
//! domain-suffix scoped for cross-subdomain SSO and marked Secure.

use crate::cache::{keys, Kv};
use crate::config::environment::SessionConfig;
use crate::errors::AppResult;
use crate::models::SessionData;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use rand::rngs::OsRng;
use rand::RngCore;

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "sso_session";

/// Loads, saves and clears browser sessions
#[derive(Clone)]
pub struct SessionManager {
    kv: Kv,
    config: SessionConfig,
}

impl SessionManager {
    /// Create a manager over the shared KV store
    #[must_use]
    pub const fn new(kv: Kv, config: SessionConfig) -> Self {
        Self { kv, config }
    }

    /// Whether UA/IP drift should force re-authentication instead of a warn
    #[must_use]
    pub const fn strict_binding(&self) -> bool {
        self.config.strict_binding
    }

    /// Load the session referenced by the request's cookie, if any
    ///
    /// # Errors
    ///
    /// Returns an error if the KV store is unreachable. A present cookie with
    /// undecodable session data yields `None` (treated as logged out).
    pub async fn load(&self, jar: &CookieJar) -> AppResult<Option<SessionData>> {
        let Some(cookie) = jar.get(SESSION_COOKIE) else {
            return Ok(None);
        };
        let Some(raw) = self.kv.get(&keys::sso_session(cookie.value())).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<SessionData>(&raw) {
            Ok(data) => Ok(Some(data)),
            Err(e) => {
                tracing::warn!("dropping undecodable session payload: {e}");
                Ok(None)
            }
        }
    }

    /// Store a fresh session and attach its cookie to the jar.
    /// Any previous session referenced by the jar is replaced client-side;
    /// its KV entry ages out on its own TTL.
    ///
    /// # Errors
    ///
    /// Returns an error if the KV write fails.
    pub async fn save(&self, jar: CookieJar, data: &SessionData) -> AppResult<CookieJar> {
        let mut id_bytes = [0u8; 32];
        OsRng.fill_bytes(&mut id_bytes);
        let session_id = hex::encode(id_bytes);

        self.kv
            .set(
                &keys::sso_session(&session_id),
                &serde_json::to_string(data)?,
                Some(keys::SESSION_TTL),
            )
            .await?;

        Ok(jar.add(self.build_cookie(session_id)))
    }

    /// Drop the server-side session and expire the cookie
    ///
    /// # Errors
    ///
    /// Returns an error if the KV delete fails.
    pub async fn clear(&self, jar: CookieJar) -> AppResult<CookieJar> {
        if let Some(cookie) = jar.get(SESSION_COOKIE) {
            self.kv.delete(&keys::sso_session(cookie.value())).await?;
        }

        let mut removal = Cookie::build((SESSION_COOKIE, "")).path("/").build();
        if !self.config.cookie_domain.is_empty() {
            removal.set_domain(self.config.cookie_domain.clone());
        }
        Ok(jar.remove(removal))
    }

    fn build_cookie(&self, session_id: String) -> Cookie<'static> {
        let mut cookie = Cookie::build((SESSION_COOKIE, session_id))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .max_age(cookie::time::Duration::days(7))
            .build();

        if !self.config.cookie_domain.is_empty() {
            cookie.set_domain(self.config.cookie_domain.clone());
        }
        if self.config.cookie_secure {
            cookie.set_secure(true);
        }
        cookie
    }
}
