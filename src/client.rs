// ABOUTME: Client-integration contract: how a relying app verifies tokens it never minted
// ABOUTME: Offline public-key verification, silent refresh, lazy user sync via the internal API
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Relying-Application Integration
//!
//! A resource server verifies access tokens entirely offline with the SSO's
//! public key — no callback per request. The contract:
//!
//! 1. Reject tokens whose `app_id` claim is not the app's own key
//!    ([`SsoTokenVerifier::verify`]).
//! 2. On expiry, redeem the server-side refresh token at `/auth/token` and
//!    hand the browser fresh credentials in the [`NEW_ACCESS_TOKEN_HEADER`] /
//!    [`TOKEN_EXPIRES_IN_HEADER`] response headers
//!    ([`SsoClient::refresh_token`]).
//! 3. Lazily create a local user row keyed by `user_uuid` on first sight,
//!    optionally pulling the profile through `GET /internal/user/:uuid`
//!    ([`SsoClient::fetch_user`]).

use crate::auth::{Claims, TokenValidationError};
use crate::models::{TokenResponse, UserInfo};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

/// Response header carrying a transparently refreshed access token
pub const NEW_ACCESS_TOKEN_HEADER: &str = "X-New-Access-Token";

/// Response header carrying the refreshed token's lifetime in seconds
pub const TOKEN_EXPIRES_IN_HEADER: &str = "X-Token-Expires-In";

/// Offline access-token verifier held by a relying app
pub struct SsoTokenVerifier {
    decoding_key: DecodingKey,
    issuer: String,
    app_key: String,
}

impl SsoTokenVerifier {
    /// Build a verifier from the SSO's public key (distributed out-of-band)
    ///
    /// # Errors
    ///
    /// Returns an error if the PEM blob does not contain a usable RSA key.
    pub fn from_public_key_pem(
        public_pem: &[u8],
        issuer: impl Into<String>,
        app_key: impl Into<String>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            decoding_key: DecodingKey::from_rsa_pem(public_pem)?,
            issuer: issuer.into(),
            app_key: app_key.into(),
        })
    }

    /// Verify an access token and reject tokens minted for other apps.
    /// An `Expired` error means the caller should attempt a silent refresh;
    /// everything else means re-authentication.
    ///
    /// # Errors
    ///
    /// Returns [`TokenValidationError`] describing the rejection.
    pub fn verify(&self, access_token: &str) -> Result<Claims, TokenValidationError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.issuer]);
        validation.leeway = 0;

        let data = decode::<Claims>(access_token, &self.decoding_key, &validation)
            .map_err(|e| token_error(&e))?;

        let claims = data.claims;
        if claims.token_type != "access_token" {
            return Err(TokenValidationError::Invalid {
                reason: "not an access token".to_owned(),
            });
        }
        if claims.app_id != self.app_key {
            return Err(TokenValidationError::Invalid {
                reason: "token不适用于此应用".to_owned(),
            });
        }
        Ok(claims)
    }
}

/// Envelope shape the SSO answers with
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: u32,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

/// HTTP client a relying app backend uses against the SSO
pub struct SsoClient {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
}

impl SsoClient {
    /// Create a client with the app's own credentials
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: into_trimmed(base_url),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Redeem an authorization code for the token pair
    ///
    /// # Errors
    ///
    /// Returns an error if the SSO is unreachable or rejects the code.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> anyhow::Result<TokenResponse> {
        self.token_request(&serde_json::json!({
            "grant_type": "authorization_code",
            "code": code,
            "redirect_uri": redirect_uri,
            "client_id": self.client_id,
            "client_secret": self.client_secret,
        }))
        .await
    }

    /// Rotate a refresh token. The returned pair replaces the stored one;
    /// the old refresh token is dead after this call.
    ///
    /// # Errors
    ///
    /// Returns an error if the SSO is unreachable or rejects the token.
    pub async fn refresh_token(&self, refresh_token: &str) -> anyhow::Result<TokenResponse> {
        self.token_request(&serde_json::json!({
            "grant_type": "refresh_token",
            "refresh_token": refresh_token,
            "client_id": self.client_id,
            "client_secret": self.client_secret,
        }))
        .await
    }

    /// Fetch a user profile through the internal surface, authenticated with
    /// the app's credentials
    ///
    /// # Errors
    ///
    /// Returns an error if the SSO is unreachable or rejects the call.
    pub async fn fetch_user(&self, user_uuid: &str) -> anyhow::Result<UserInfo> {
        let response = self
            .http
            .get(format!("{}/internal/user/{user_uuid}", self.base_url))
            .header("X-Client-ID", &self.client_id)
            .header("X-Client-Secret", &self.client_secret)
            .send()
            .await?;

        let envelope: Envelope<UserInfo> = response.json().await?;
        unwrap_envelope(envelope)
    }

    async fn token_request(&self, body: &serde_json::Value) -> anyhow::Result<TokenResponse> {
        let response = self
            .http
            .post(format!("{}/auth/token", self.base_url))
            .json(body)
            .send()
            .await?;

        let envelope: Envelope<TokenResponse> = response.json().await?;
        unwrap_envelope(envelope)
    }
}

fn unwrap_envelope<T>(envelope: Envelope<T>) -> anyhow::Result<T> {
    if envelope.code != 0 {
        anyhow::bail!("SSO answered code {}: {}", envelope.code, envelope.msg);
    }
    envelope
        .data
        .ok_or_else(|| anyhow::anyhow!("SSO answered success without data"))
}

fn into_trimmed(base_url: impl Into<String>) -> String {
    let mut url = base_url.into();
    while url.ends_with('/') {
        url.pop();
    }
    url
}

fn token_error(e: &jsonwebtoken::errors::Error) -> TokenValidationError {
    match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenValidationError::Expired,
        jsonwebtoken::errors::ErrorKind::InvalidSignature => TokenValidationError::Invalid {
            reason: "signature verification failed".to_owned(),
        },
        jsonwebtoken::errors::ErrorKind::InvalidIssuer => TokenValidationError::Invalid {
            reason: "unknown issuer".to_owned(),
        },
        _ => TokenValidationError::Malformed {
            details: e.to_string(),
        },
    }
}
